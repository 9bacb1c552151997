//! # assessor-fhir
//!
//! Read access to the FHIR data repository.
//!
//! [`FhirDataClient`] implements
//! [`ReferenceDataClient`](assessor_core::traits::ReferenceDataClient) over
//! plain `GET {base}/{type}/{id}` reads. Failures are classified for the
//! orchestrator's retry policy:
//!
//! | cause                                   | transient |
//! |-----------------------------------------|-----------|
//! | timeout, refused connection, 5xx, 429   | yes       |
//! | 404 and other 4xx, undecodable body     | no        |
//! | body is not the requested resource      | no        |
//!
//! [`fixtures`] holds fictional resources for offline runs.

pub mod client;
pub mod fixtures;

pub use client::FhirDataClient;
