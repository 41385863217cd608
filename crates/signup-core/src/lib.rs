//! Core signup library (form validation, PKCE, Google sign-in, backend client, config).

pub mod backend;
pub mod config;
pub mod form;
pub mod oauth;
pub mod pkce;
