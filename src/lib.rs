#![allow(clippy::needless_range_loop)]
#![warn(unused_assignments)]
#![warn(unused_mut)]
#![warn(unused_imports)]
#![warn(unused_labels)]
#![warn(unused_parens)]
#![warn(unused_variables)]

//! A tree model for XML documents that cannot represent a malformed document.
//!
//! Every mutation of a tree under [`dom`] is checked before it is applied, so a tree
//! can always be written out by [`serializer::Serializer`] and read back by
//! [`builder::Builder`] into an equal tree.

#[cfg(feature = "builder")]
pub mod builder;
pub mod dom;
pub mod encoding;
pub mod error;
pub mod serializer;
pub mod uri;
pub mod verifier;
pub mod xpath;
