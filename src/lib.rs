//! Turns untrusted model-generated JSON material descriptions into
//! validated, repaired, laid-out shader node graphs.
//!
//! The flow is: [`session`] obtains and cleans raw response text,
//! [`schema`] validates it into a [`spec::GraphSpec`], [`repair`] fixes
//! known generation mistakes, and [`builder`] realizes the graph against
//! a [`runtime::NodeGraphRuntime`], consulting [`catalog`], [`resolver`],
//! [`configure`], and [`layout`] along the way.

pub mod builder;
pub mod catalog;
pub mod configure;
pub mod layout;
pub mod merge;
pub mod repair;
pub mod resolver;
pub mod runtime;
pub mod schema;
pub mod session;
pub mod spec;
