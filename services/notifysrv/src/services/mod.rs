pub mod consumer;
pub mod decision;
pub mod media;
pub mod processor;
pub mod resolver;

pub use consumer::Notifier;
pub use decision::DecisionEngine;
pub use media::MediaSelector;
pub use processor::NotificationProcessor;
pub use resolver::{ResolvedRules, RuleResolver};
