//! qi: a stateful GraphQL query client.
//!
//! Queries can capture values from their responses and later queries can
//! use them, without copying tokens or ids around by hand:
//!
//! ```graphql
//! mutation login($user: String!, $password: String!) {
//!   login(user: $user, password: $password) {
//!     token @setParameter(name: "token")
//!   }
//! }
//!
//! query me($__STATE__token: String!) {
//!   me(token: $__STATE__token) { id }
//! }
//! ```
//!
//! Captured values are kept per client in `.qi/cache.json`. A client may
//! have an authorizer; when the server answers 401 the client authorizes
//! once and repeats the query.
//!
//! # Architecture
//!
//! - **graphql**: document parsing and the `@setParameter` directive processor
//! - **variables**: `__STATE__` variable resolution
//! - **auth**: authorizers and the per-client authorization controller
//! - **executor**: the HTTP transport
//! - **client**: the query pipeline with its single retry on 401
//! - **store**: the persistent key-path store
//! - **config**: `.qi/settings.json`
//! - **manager**: project sessions, query catalogs and selection
//! - **models**: request and response envelopes
//!
//! # Usage
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use qi_client::client::QueryParams;
//! use qi_client::manager::Session;
//!
//! let session = Session::init(".").await?;
//! let response = session
//!     .query("default", &QueryParams::new("{ me { id } }"))
//!     .await?;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod executor;
pub mod graphql;
pub mod manager;
pub mod models;
pub mod store;
pub mod variables;

pub use client::{Client, QueryError, QueryFailure, QueryParams};
pub use manager::Session;
pub use models::{QueryResponse, RequestEnvelope};
