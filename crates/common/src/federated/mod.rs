//! Federated averaging coordinator
//!
//! Clients train a logistic regression model on their own data and submit
//!  only parameter updates. The [`Coordinator`] buffers one update per
//!  client per round and combines them with an [`AggregationStrategy`],
//!  FedAvg by default:
//!
//! ```text
//! new = Σ(delta_i · n_i) / Σ n_i
//! ```
//!
//! Updates that carry no samples are left out of the average.

mod aggregator;
mod coordinator;
mod messages;
mod model;
mod settings;
mod update;

pub use aggregator::{AggregateError, Aggregation, AggregationStrategy};
pub use coordinator::{
    ClientInfo, Coordinator, CoordinatorError, CoordinatorStatus, RoundRecord, RoundState,
    SubmitReceipt,
};
pub use messages::{Request, Response};
pub use model::{DimensionMismatch, GlobalModel, DECISION_THRESHOLD};
pub use settings::{
    FederatedSettings, SettingsError, DEFAULT_MAX_ROUNDS, DEFAULT_MIN_CLIENTS_FOR_ROUND,
    DEFAULT_NUM_FEATURES,
};
pub use update::{ClientId, ClientUpdate, MAX_SAMPLES_PER_UPDATE};
