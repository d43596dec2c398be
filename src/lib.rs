//! Client for the Volcano Bidirectional TTS protocol: a state machine that
//! speaks a proprietary binary framing over a secure WebSocket to drive
//! streaming text-to-speech synthesis.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use volcano_tts::{Event, Request, TtsClient, TtsClientBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TtsClientBuilder::new("your-app-id")
//!         .access_key("your-access-key")
//!         .build()?;
//!
//!     let client = TtsClient::new(config, |event| match event {
//!         Event::Open { connect_id, .. } => println!("connected: {connect_id}"),
//!         Event::Audio { data, .. } => println!("{} bytes of audio", data.len()),
//!         Event::Close { .. } => println!("closed"),
//!         _ => {}
//!     });
//!
//!     client.run();
//!     client.request(Request {
//!         session_id: "session-1".to_string(),
//!         text: "hello".to_string(),
//!         speaker: "zh_female_meilinvyou_moon_bigtts".to_string(),
//!     });
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module map
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`codec`] | Binary wire frame serialize/parse. |
//! | [`payload`] | JSON payload construction for control-plane frames. |
//! | [`transport`] | Async TLS + WebSocket transport and the `SessionHooks` seam. |
//! | [`queue`] | FIFO of pending user requests. |
//! | [`session`] | The 8-state TTS state machine. |
//! | [`event`] | The uniform user-visible event stream. |
//! | [`config`] | Client configuration and its builder. |
//! | [`client`] | Public facade wiring everything together. |
//! | [`error`] | The crate's error taxonomy. |

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod payload;
pub mod queue;
pub mod session;
pub mod transport;

pub use client::TtsClient;
pub use config::{ClientConfig, TtsClientBuilder};
pub use error::{Error, Result};
pub use event::Event;
pub use queue::Request;
pub use session::ConnState;
