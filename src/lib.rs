//! # mailtrace
//!
//! Track outgoing email: opens, clicks, and provider delivery outcomes.
//!
//! mailtrace sits between your app and your mail transport. On the way
//! out it stamps each message with a correlation token, injects an open
//! pixel and rewrites links, and persists one record per recipient. On
//! the way back it joins provider webhooks (SES/SNS, Mailgun) and
//! pixel/click hits onto those records.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mailtrace::{MailTracker, OutboundEmail, TrackerConfig};
//!
//! let tracker = MailTracker::new(TrackerConfig::new("https://app.example.com/email"));
//!
//! let mut email = OutboundEmail::new()
//!     .to("user@example.com")
//!     .from("noreply@example.com")
//!     .subject("Welcome!")
//!     .html_body("<html><body><a href=\"https://example.com\">Hi</a></body></html>");
//!
//! tracker.set_mailer(Some("ses"));
//! let records = tracker.intercept(&mut email, None)?;
//! // hand `email` to your transport, then:
//! // tracker.message_sent(&sent_message);
//! ```
//!
//! Mount the HTTP endpoints (pixel, click redirect, webhooks) under the
//! same base URL:
//!
//! ```rust,ignore
//! let app = axum::Router::new().nest("/email", mailtrace::routes::router(tracker));
//! ```
//!
//! ## Storage
//!
//! Records live behind the [`SentEmailStore`] trait and captured bodies
//! behind [`ContentStore`]; the bundled in-memory implementations are for
//! development and tests. Implement the traits over your database and
//! blob storage for production.
//!
//! ## Events
//!
//! Everything the pipeline learns is announced through an [`EventSink`]:
//! `Sent`, `Delivered`, `PermanentBounce`, `TransientBounce`,
//! `Complaint`, `Opened`, `LinkClicked`. Each event carries the affected
//! record.

pub mod address;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod hash;
pub mod intercept;
pub mod message;
pub mod model;
pub mod purge;
pub mod reconcile;
pub mod resolver;
pub mod rewrite;
#[cfg(feature = "routes")]
pub mod routes;
pub mod store;
pub mod tracker;
pub mod trackers;

pub use address::{Address, ToAddress};
pub use config::{ContentStrategy, TrackerConfig};
pub use drivers::{
    CallbackDisposition, CallbackRequest, DriverRegistry, LocalDriver, MailgunDriver, Outcome,
    SesDriver, TrackerDriver, WebhookEvent,
};
pub use error::TrackError;
pub use events::{CollectingSink, EventSink, NullSink, TrackingEvent};
pub use intercept::OutboundInterceptor;
pub use message::{BodyPart, Headers, MultipartKind, OutboundEmail, SentMessage};
pub use model::{BodySnapshot, MailableRef, Meta, SentRecord, UrlClick};
pub use purge::RecordPurger;
pub use reconcile::{EventReconciler, MessageIdReconciler};
pub use resolver::{DefaultMailerResolver, MailerResolver};
pub use store::{ContentStore, MemoryContentStore, MemoryStore, SentEmailStore};
pub use tracker::{MailTracker, MailTrackerBuilder};
