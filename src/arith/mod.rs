//! The MPC arithmetic core: distributed secrets, resharing, multiplication,
//! and the distributed Diffie-Hellman check.

mod checkdh;
mod key;
mod mult;
mod poly;
mod reshare;
mod secret;

pub use checkdh::check_dh;
pub use key::{gen_exp_reveal, DKey, TDKey};
pub use mult::mult;
pub use secret::{gen, lin, ADSecret, DSecret, TDSecret};

pub(crate) use poly::lagrange_coefficient_at_zero;
pub(crate) use secret::commit_share;
