//! # Step rule engine
//!
//! Evaluates the small boolean expressions that gate workflow steps, e.g.
//! `product.attrs.layers >= 4`. The single implicit variable `product` is
//! bound to the order under evaluation; values are the closed
//! [`AttrValue`](prodline_types::AttrValue) type.
//!
//! Expressions support `&&`, `||`, `!`, the six comparison operators,
//! `+ - * / %`, unary minus, parentheses, and int/float/string/bool
//! literals. Compiled programs are cached per rule text in a [`RuleSet`].

pub mod error;
mod lexer;
mod parser;
pub mod program;

pub use error::{Result, RuleError};
pub use program::{Program, RuleSet};
