//! User-visible notifications.
//!
//! A broadcast hub standing in for the toast layer. Presentation code
//! subscribes and renders whatever arrives; subscribers that fall behind miss
//! old notices rather than blocking senders.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::cart::ProductSnapshot;

/// How long the "added to cart" toast stays up.
pub const CART_TOAST_DURATION: Duration = Duration::from_secs(3);

const CHANNEL_CAPACITY: usize = 64;

/// Severity of a plain notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Payload of the rich "added to cart" toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartToast {
    pub product: ProductSnapshot,
    pub quantity: u32,
    pub duration: Duration,
}

/// Something the user should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Message { level: NoticeLevel, text: String },
    CartAdded(CartToast),
}

impl Notice {
    /// The text of a plain notice.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { text, .. } => Some(text),
            Self::CartAdded(_) => None,
        }
    }

    /// Whether this is an error notice.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Message {
                level: NoticeLevel::Error,
                ..
            }
        )
    }
}

/// Cloneable notification sender.
#[derive(Debug, Clone)]
pub struct Notifications {
    sender: broadcast::Sender<Notice>,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifications {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Receive every notice sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn info(&self, text: impl Into<String>) {
        self.message(NoticeLevel::Info, text.into());
    }

    pub fn success(&self, text: impl Into<String>) {
        self.message(NoticeLevel::Success, text.into());
    }

    /// Send an error notice. Also logged, since nobody may be listening.
    pub fn error(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::error!(notice = %text, "User-facing error");
        self.message(NoticeLevel::Error, text);
    }

    /// Show the "added to cart" toast for `product`.
    pub fn cart_added(&self, product: ProductSnapshot, quantity: u32) {
        self.send(Notice::CartAdded(CartToast {
            product,
            quantity,
            duration: CART_TOAST_DURATION,
        }));
    }

    fn message(&self, level: NoticeLevel, text: String) {
        self.send(Notice::Message { level, text });
    }

    fn send(&self, notice: Notice) {
        // No receivers is fine: nothing is rendering notices right now
        let _ = self.sender.send(notice);
    }
}
