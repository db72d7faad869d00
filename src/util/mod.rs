//! Small helpers shared by the feed engine, the servers and the config loader.
//!
//! - **Durations**: Go-style duration strings (`"5s"`, `"1m30s"`) used by
//!   listener poll intervals
//! - **URLs**: base-URL validation and href resolution against a feed's base
//!
//! # Examples
//!
//! ```
//! use budevents::util::{parse_duration, resolve_href};
//! use std::time::Duration;
//!
//! assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
//! assert_eq!(
//!     resolve_href("http://localhost:8080", "/v1/events/abc"),
//!     "http://localhost:8080/v1/events/abc"
//! );
//! ```

mod duration;
mod url_validator;

pub use duration::{deserialize_duration, parse_duration, DurationError};
pub use url_validator::{resolve_href, validate_base_url, UrlError};
