//! # Bronze Core
//!
//! Foundation types for the Bronze bot framework.
//!
//! This crate has no transport or dispatch logic of its own. It defines
//! what flows between the two:
//!
//! - **Events**: [`Event`] parsing and normalization (detail types,
//!   at-mention handling, guild id synthesis)
//! - **Messages**: [`Content`], [`Segment`] and the dual-form [`MessageId`]
//! - **Calls**: [`ApiRequest`], [`ApiResponse`], the [`ApiCaller`] capability
//!   and the echo-token [`Correlator`]
//! - **Drivers**: the [`Driver`] contract, [`Frame`] classification and the
//!   [`CallerDirectory`] of connected peers
//!
//! ```text
//! ┌───────────┐ frame ┌──────────────┐ event ┌────────────┐
//! │  Driver   │──────▶│ route_frame  │──────▶│ EventSink  │
//! └───────────┘       └──────────────┘       └────────────┘
//!       ▲                    │ response
//!       │ call_api           ▼
//!       └──────────────  Correlator
//! ```

pub mod api;
pub mod config;
pub mod correlator;
pub mod directory;
pub mod driver;
pub mod error;
pub mod event;
pub mod message;

pub use api::{ApiCaller, ApiRequest, ApiResponse, BoxedCaller, downcast_caller};
pub use config::BotConfig;
pub use correlator::{CALL_TIMEOUT, Correlator, PendingCall};
pub use directory::CallerDirectory;
pub use driver::{BoxedDriver, Driver, DriverContext, EventSink, Frame};
pub use error::{ApiError, ApiResult, TransportError, TransportResult};
pub use event::{Event, Sender};
pub use message::{Content, MessageId, Segment, synthesize_id};
