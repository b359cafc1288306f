//! Variables module for qi
//!
//! This module resolves the variables sent with a GraphQL operation,
//! combining caller-supplied values with values persisted in a client's
//! state by earlier `@setParameter` extractions.

pub mod state;

pub use state::{
    client_state, merge_deep_left, resolve, resolve_variables, state_key, state_variables_object,
    used_outside_variables, used_state_variables, variables_with_state_vars, which_vars,
    VarUsage, VariablePayload, STATE_PREFIX,
};
