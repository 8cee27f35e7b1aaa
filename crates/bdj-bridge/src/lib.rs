//! Embedded JVM bridge for BD-J playback.
//!
//! Provides [`Session`], the single interface between a disc player and the
//! Java runtime hosting the disc's interactive program. A session locates
//! and loads the JVM library, resolves the boot archive, creates the VM,
//! and relays title control and playback events into it.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use bdj_bridge::{BridgeConfig, EventCode, Host, Session};
//! use std::path::Path;
//!
//! # fn run() -> Result<(), bdj_bridge::BridgeError> {
//! let config = BridgeConfig::load(None)?;
//! let session = Session::open(Path::new("/media/disc"), Host::detached(), &config)?;
//!
//! session.start(1)?;
//! session.process_event(EventCode::Chapter, 2);
//! session.stop()?;
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod disc_id;
pub mod entry;
pub mod error;
pub mod event;
pub mod invoker;
pub mod jvm;
pub mod locator;
pub mod natives;
pub mod resources;
pub mod runtime;
pub mod session;
pub mod stub;

pub use config::BridgeConfig;
pub use disc_id::DiscIdentity;
pub use error::{BridgeError, Fault};
pub use event::EventCode;
pub use natives::{NativeFn, NativeTable};
pub use session::{Host, OverlaySink, Session, SessionState, session_from_handle};
