//! # Messaging Module
//!
//! Inbound item notifications and outbound batch announcements. The check loop
//! talks to the stream only through [`NotificationSource`] and
//! [`UpdatePublisher`]; pgmq and in-memory implementations ship with the crate.

pub mod errors;
pub mod in_memory_client;
pub mod message;
pub mod pgmq_client;
pub mod traits;

pub use errors::{MessagingError, MessagingResult};
pub use in_memory_client::{InMemoryPublisher, InMemorySource};
pub use message::{Notification, RawNotification};
pub use pgmq_client::{PgmqClient, PgmqNotificationSource};
pub use traits::{NotificationSource, UpdatePublisher};
