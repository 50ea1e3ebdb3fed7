// Integration tests

mod middleware_test;
mod reconciliation_test;
mod token_store_test;
