mod store;

pub use store::{
    EndpointFilter, EndpointPatch, NewEndpoint, StoreError, create_endpoint, delete_endpoint,
    get_endpoint, list_endpoints, set_active, update_endpoint,
};
