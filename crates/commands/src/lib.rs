//! Chat control surface for the tailnet exposure.
//!
//! The chat platform's dispatcher, user directory, ephemeral posting, and
//! per-user credential storage are external collaborators; they appear here
//! only as traits ([`ChatPoster`], [`UserDirectory`], [`CredentialStore`],
//! [`ControlPlaneApi`]). A dispatcher hands the raw command text to
//! [`router::execute`], which routes to the handlers and posts exactly one
//! human-readable reply.

pub mod control_plane;
pub mod router;
pub mod serve;
pub mod store;
pub mod traits;

pub use control_plane::HttpControlPlane;
pub use router::{CommandArgs, CommandEnv, execute};
pub use store::FileCredentialStore;
pub use traits::{ChatPoster, ControlPlaneApi, CredentialStore, UserCredentials, UserDirectory};
