//! Message and message identifier types
//!
//! A [`Message`] is immutable once built; its identity is the caller-supplied
//! [`MessageId`], which doubles as the idempotency key for dispatch.

use std::{
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Caller-supplied message identifier
///
/// Cheap to clone, so it can be used as a map key by the dedup store while
/// the message itself is still borrowed by an in-flight dispatch.
///
/// # Examples
///
/// ```
/// use courier_common::MessageId;
///
/// let id = MessageId::new("order-42");
/// assert_eq!(id.as_str(), "order-42");
///
/// let id: MessageId = "order-43".into();
/// assert_eq!(id.to_string(), "order-43");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MessageId(Arc<str>);

impl MessageId {
    #[must_use]
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for MessageId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

/// A logical message ("email") to be handed to a delivery provider
///
/// No validation or templating is applied to any field; the dispatcher only
/// cares about the id, and the transports about the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    to: String,
    subject: String,
    body: String,
}

impl Message {
    #[must_use]
    pub fn new(
        id: impl Into<MessageId>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &MessageId {
        &self.id
    }

    /// Recipient address
    #[must_use]
    pub fn to(&self) -> &str {
        &self.to
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_equality() {
        let a = MessageId::new("abc");
        let b: MessageId = String::from("abc").into();
        assert_eq!(a, b);
        assert_ne!(a, MessageId::new("abd"));
    }

    #[test]
    fn test_message_id_deref() {
        let id = MessageId::new("deref-me");
        assert_eq!(id.len(), 8);
        assert!(id.starts_with("deref"));
    }

    #[test]
    fn test_message_accessors() {
        let message = Message::new("1", "someone@example.com", "Hi", "Hello there");
        assert_eq!(message.id().as_str(), "1");
        assert_eq!(message.to(), "someone@example.com");
        assert_eq!(message.subject(), "Hi");
        assert_eq!(message.body(), "Hello there");
    }

    #[test]
    fn test_message_deserialize_ron() {
        let message: Message = ron::from_str(
            r#"(id: "welcome-1", to: "a@example.com", subject: "Welcome", body: "Hello")"#,
        )
        .unwrap();

        assert_eq!(message.id(), &MessageId::new("welcome-1"));
        assert_eq!(message.to(), "a@example.com");
    }
}
