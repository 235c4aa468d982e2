//! Core traits and types for the pushweld engine.
//!
//! This module contains the fundamental traits, the error type, demand
//! tracking and the serialized emitter that every operator delivers through.

pub(crate) mod emitter;
pub mod error;
pub mod subscription;
pub mod traits;

// Re-export core items
pub use error::{Error, IntoError, Result};
pub use subscription::{add_demand, Demand, Subscription, SubscriptionHandle, UNBOUNDED};
pub use traits::{BoxOperator, BoxSubscriber, Operator, OperatorExt, Subscriber};
