pub mod covenant;
pub mod hash;
pub mod sig;

pub use covenant::{
    stochastic_secret, stochastic_secret_hash, CovenantBuilder, CovenantParams, MasterKey,
    NoCovenant,
};
pub use hash::{hash160, keccak256, sha256};
pub use sig::{EcdsaRecover, SigRecover};
