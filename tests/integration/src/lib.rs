//! End-to-end binding flows for the federation proxy.
//!
//! The flows live under `tests/` and drive `fp_saml::BindingEngine` with an
//! in-memory registry, a recording form renderer and a service table.
