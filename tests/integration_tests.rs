//! Integration tests entry point.
//!
//! Collects the tests under `integration/` into one test binary.

mod integration;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integration_tests_module_loads() {
        integration::init_test_env();
    }
}
