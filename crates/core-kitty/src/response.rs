//! Wire responses sent back to the client over the APC channel:
//! `ESC _ G key=value,...;message ESC \`.

use std::fmt;

/// Mirrors the subset of `errno`-style codes the protocol defines for
/// reporting failures back to a client (`EINVAL`, `ENOENT`, ...). Plain text
/// is also allowed and used for the OK acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Einval,
    Enoent,
    Enomem,
    Ebadf,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Einval => "EINVAL",
            ErrorKind::Enoent => "ENOENT",
            ErrorKind::Enomem => "ENOMEM",
            ErrorKind::Ebadf => "EBADF",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Ok,
    Error { kind: ErrorKind, message: String },
}

/// A response to a single command, carrying the `i=`/`I=`/`p=` identifiers
/// the client used so it can match the response back to its request.
#[derive(Debug, Clone)]
pub struct Response {
    pub image_id: u32,
    pub image_number: u32,
    pub placement_id: u32,
    pub payload: Payload,
}

impl Response {
    pub fn ok(image_id: u32, image_number: u32, placement_id: u32) -> Self {
        Response {
            image_id,
            image_number,
            placement_id,
            payload: Payload::Ok,
        }
    }

    pub fn error(image_id: u32, image_number: u32, placement_id: u32, kind: ErrorKind, message: impl Into<String>) -> Self {
        Response {
            image_id,
            image_number,
            placement_id,
            payload: Payload::Error {
                kind,
                message: message.into(),
            },
        }
    }

    /// Render the full `ESC _ G ... ESC \` APC string. Quiet suppression is
    /// the caller's responsibility (this always formats): skip sending the
    /// string entirely rather than relying on format() to swallow it.
    pub fn format(&self) -> String {
        let mut kv = String::new();
        if self.image_id != 0 {
            kv.push_str(&format!("i={},", self.image_id));
        }
        if self.image_number != 0 {
            kv.push_str(&format!("I={},", self.image_number));
        }
        if self.placement_id != 0 {
            kv.push_str(&format!("p={},", self.placement_id));
        }
        kv.pop(); // trailing comma, if any field was emitted

        let message = match &self.payload {
            Payload::Ok => "OK".to_string(),
            Payload::Error { kind, message } => {
                if message.is_empty() {
                    kind.to_string()
                } else {
                    format!("{kind}:{message}")
                }
            }
        };

        format!("\x1b_G{kv};{message}\x1b\\")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_formats_with_identifiers() {
        let r = Response::ok(31, 0, 0);
        assert_eq!(r.format(), "\x1b_Gi=31;OK\x1b\\");
    }

    #[test]
    fn error_response_includes_kind_and_message() {
        let r = Response::error(31, 0, 0, ErrorKind::Enoent, "file not found");
        assert_eq!(r.format(), "\x1b_Gi=31;ENOENT:file not found\x1b\\");
    }

    #[test]
    fn error_with_empty_message_omits_colon() {
        let r = Response::error(0, 0, 0, ErrorKind::Einval, "");
        assert_eq!(r.format(), "\x1b_G;EINVAL\x1b\\");
    }

    #[test]
    fn all_identifiers_present() {
        let r = Response::ok(1, 2, 3);
        assert_eq!(r.format(), "\x1b_Gi=1,I=2,p=3;OK\x1b\\");
    }
}
