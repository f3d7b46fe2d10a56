//! Command Handler
//!
//! Maps a decoded [`Command`] onto a [`StorageEngine`] call and produces the
//! [`Response`] to send back. The handler performs no I/O; the connection
//! layer owns the socket.
//!
//! | Command | Response |
//! |---------|----------|
//! | `SET`   | `OK` |
//! | `GET`   | value, `-ERR 1004 Key not found`, or `-ERR 1004 Key not found (expired)` |
//! | `DEL`   | `OK`, whether or not the key existed |
//! | `RAL`   | `OK` |
//! | other   | `-ERR unknown command` |

use crate::protocol::{Command, Response};
use crate::storage::{Lookup, StorageEngine};
use std::sync::Arc;
use tracing::trace;

/// Executes commands against the shared storage engine.
///
/// Cheap to clone; every clone shares the same engine.
#[derive(Clone, Debug)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Returns the storage engine this handler writes to.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a command and returns the response.
    pub fn execute(&self, command: Command) -> Response {
        let response = match command {
            Command::Get { key } => self.cmd_get(&key),
            Command::Set {
                key,
                value,
                ttl_secs,
            } => {
                self.storage.set_with_ttl_secs(key, value, ttl_secs);
                Response::Ok
            }
            Command::Del { key } => {
                self.storage.delete(&key);
                Response::Ok
            }
            Command::RemoveAll => {
                self.storage.flush();
                Response::Ok
            }
            Command::Unknown(tag) => {
                trace!(tag = ?tag, "Unknown command");
                Response::unknown_command()
            }
        };

        trace!(response = %response, "Command executed");
        response
    }

    fn cmd_get(&self, key: &[u8]) -> Response {
        match self.storage.lookup(key) {
            Lookup::Found(value) => Response::Value(value),
            Lookup::Missing => Response::not_found(),
            Lookup::Expired => Response::expired(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()))
    }

    fn get(key: &str) -> Command {
        Command::Get {
            key: Bytes::from(key.to_string()),
        }
    }

    fn set(key: &str, value: &str, ttl_secs: u32) -> Command {
        Command::Set {
            key: Bytes::from(key.to_string()),
            value: Bytes::from(value.to_string()),
            ttl_secs,
        }
    }

    fn del(key: &str) -> Command {
        Command::Del {
            key: Bytes::from(key.to_string()),
        }
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        assert_eq!(handler.execute(set("foo", "bar", 0)), Response::Ok);
        assert_eq!(
            handler.execute(get("foo")),
            Response::Value(Bytes::from("bar"))
        );
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();
        assert_eq!(handler.execute(get("nonexistent")), Response::not_found());
    }

    #[test]
    fn test_get_expired() {
        let handler = create_handler();

        handler.storage().set_with_ttl(
            Bytes::from("temp"),
            Bytes::from("value"),
            Duration::from_millis(10),
        );
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(handler.execute(get("temp")), Response::expired());
        // Gone for good after the first observation
        assert_eq!(handler.execute(get("temp")), Response::not_found());
    }

    #[test]
    fn test_del_always_ok() {
        let handler = create_handler();

        handler.execute(set("key", "value", 0));
        assert_eq!(handler.execute(del("key")), Response::Ok);
        assert_eq!(handler.execute(del("key")), Response::Ok);
        assert_eq!(handler.execute(del("never-set")), Response::Ok);
        assert_eq!(handler.execute(get("key")), Response::not_found());
    }

    #[test]
    fn test_remove_all() {
        let handler = create_handler();

        for i in 0..20 {
            handler.execute(set(&format!("key{}", i), "value", 0));
        }

        assert_eq!(handler.execute(Command::RemoveAll), Response::Ok);
        for i in 0..20 {
            assert_eq!(
                handler.execute(get(&format!("key{}", i))),
                Response::not_found()
            );
        }
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_set_with_ttl_secs() {
        let handler = create_handler();

        handler.execute(set("session", "abc", 60));
        assert_eq!(
            handler.execute(get("session")),
            Response::Value(Bytes::from("abc"))
        );
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        let response = handler.execute(Command::Unknown(Bytes::from_static(b"PUT")));
        assert_eq!(response, Response::unknown_command());
        assert_eq!(&response.serialize()[..], b"-ERR unknown command");
    }
}
