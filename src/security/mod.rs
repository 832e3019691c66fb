//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Exchange (pipeline info attached)
//!     → mechanisms.rs (first mechanism that attempts decides: account or 401)
//!     → authorizers.rs (secured routes: an allower grants, no vetoer forbids)
//!     → tokens.rs (authenticated callers get a token header)
//!     → next stage
//! ```
//!
//! # Design Decisions
//! - Fail closed: a secured route with no allower configured forbids everything
//! - Unauthenticated callers get 401 with challenges only when a mechanism
//!   could have authenticated them; otherwise 403
//! - No trust in client input: identity headers are set by the gateway only

pub mod authorizers;
pub mod chain;
pub mod mechanisms;
pub mod tokens;

pub use authorizers::{
    AclAuthorizer, Authorizer, AuthorizerType, FullAuthorizer, MethodVetoer, UNAUTHENTICATED_ROLE,
};
pub use chain::SecurityChain;
pub use mechanisms::{AuthMechanism, AuthOutcome, BasicAuthMechanism, TokenAuthMechanism};
pub use tokens::{RandomTokenManager, Token, TokenError, TokenManager, AUTH_TOKEN, AUTH_TOKEN_VALID_UNTIL};
