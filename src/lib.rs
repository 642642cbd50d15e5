//! Asterisk Manager Interface (AMI) client for Rust
//!
//! This crate provides an async Rust client for Asterisk's Manager Interface,
//! allowing applications to log in, send actions, and receive events over the
//! line-oriented AMI protocol (TCP port 5038).
//!
//! # Architecture
//!
//! The library uses a split reader/writer design:
//! - [`AmiClient`] (Clone + Send) — send actions from any task, many in flight at once
//! - a background reader task that matches responses to actions by `ActionID`,
//!   collects event lists, and fans events out to listeners
//! - [`AmiEventStream`] — receive events as a stream
//!
//! # Examples
//!
//! ## Connect and send an action
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiAction, AmiClient, AmiConfig, AmiError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AmiError> {
//!     let config = AmiConfig::new("localhost", "admin", "amp111");
//!     let client = AmiClient::connect(config).await?;
//!
//!     let response = client.send(AmiAction::ping()).await?.into_result()?;
//!     println!("Ping: {}", response.field("Ping").unwrap_or("?"));
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Event lists
//!
//! Actions such as `CoreShowChannels` answer with `EventList: start`, a
//! series of events carrying the same `ActionID`, and a terminating
//! `...Complete` event. [`AmiClient::send`] returns once the list is
//! complete:
//!
//! ```rust,no_run
//! # async fn example(client: asterisk_ami_tokio::AmiClient) -> Result<(), asterisk_ami_tokio::AmiError> {
//! use asterisk_ami_tokio::AmiAction;
//!
//! let response = client.send(AmiAction::core_show_channels()).await?;
//! for event in response.events() {
//!     println!("{} {}", event.channel().unwrap_or("?"), event.field("ChannelStateDesc").unwrap_or(""));
//! }
//! println!("{:?} channels", response.list_items());
//! # Ok(())
//! # }
//! ```
//!
//! ## Building actions
//!
//! Typed constructors cover common actions; anything else is a name plus
//! fields. Values containing line breaks are rejected:
//!
//! ```rust
//! use asterisk_ami_tokio::AmiAction;
//!
//! let action = AmiAction::originate("PJSIP/100", "from-internal", "200", 1)?
//!     .field("CallerID", "Reception <100>")?
//!     .variable("CDR(userfield)", "campaign-7")?;
//! assert!(action.to_wire_format()?.starts_with("Action: Originate\r\n"));
//! assert!(AmiAction::new("Redirect").field("Channel", "x\r\nAction: Hangup").is_err());
//! # Ok::<(), asterisk_ami_tokio::AmiError>(())
//! ```
//!
//! ## Events
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiClient, AmiConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AmiClient::connect(AmiConfig::new("localhost", "admin", "amp111")).await?;
//!
//!     client.add_event_listener(
//!         |event| event.is_named("Hangup"),
//!         |event| println!("hangup on {}", event.channel().unwrap_or("?")),
//!     );
//!
//!     let mut events = client.events();
//!     while let Some(Ok(event)) = events.recv().await {
//!         println!("Received event: {:?}", event.name());
//!     }
//!
//!     Ok(())
//! }
//! ```

#[macro_use]
mod macros;

pub mod action;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod event;
pub mod fields;
pub mod listener;
pub mod message;
pub mod names;
pub mod response;

pub(crate) mod aggregator;
pub(crate) mod buffer;
pub(crate) mod correlator;
pub(crate) mod protocol;

pub use action::AmiAction;
pub use config::AmiConfig;
pub use connection::{AmiClient, AmiEventStream, ConnectionState, DisconnectReason};
pub use constants::DEFAULT_AMI_PORT;
pub use error::{AmiError, AmiResult};
pub use event::AmiEvent;
pub use fields::FieldMap;
pub use listener::ListenerId;
pub use message::AmiMessage;
pub use names::{FieldName, ParseFieldNameError};
pub use response::{AmiResponse, ResponseStatus};
