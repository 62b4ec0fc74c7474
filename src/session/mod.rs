//! Per-connection protocol sessions.
//!
//! - [`Session`]: what `initialize` recorded for one session id
//! - [`SessionStore`]: the process-wide session table
//!
//! ```rust
//! use anilist_mcp::session::SessionStore;
//! use serde_json::{Map, json};
//!
//! let store = SessionStore::new();
//! let mut client = Map::new();
//! client.insert("name".into(), json!("inspector"));
//!
//! let session = store.initialize("abc", client);
//! assert_eq!(session.id, "abc");
//! assert!(store.contains("abc"));
//! ```

mod store;

pub use store::{Session, SessionStore};
