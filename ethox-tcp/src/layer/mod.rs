//! Protocol layers.
//!
//! There is only one layer, tcp. Everything below it, addressing and routing in particular, is
//! left to the caller who hands over parsed segments and receives finished ones.
pub mod tcp;
