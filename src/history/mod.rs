mod store;

pub use store::{
    AttemptRecord, NewDelivery, StoreError, abandon_delivery, create_delivery, get_attempt,
    get_delivery, list_attempts, record_attempt, stats,
};
