//! Integration tests: full pipelines against an in-memory SQLite store
//! with scripted model and quote providers.

mod api;
mod challenge_flow;
mod mock_providers;
mod pipeline;
