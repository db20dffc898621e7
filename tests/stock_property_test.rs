//! Random admin stock corrections against a real database: stock never goes
//! negative and refused corrections change nothing.

mod common;

use common::TestApp;
use perfume_store_api::errors::ServiceError;
use proptest::prelude::*;
use rust_decimal_macros::dec;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn stock_never_goes_negative(
        initial in 0i32..20,
        deltas in prop::collection::vec(-15i32..15, 1..12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let app = TestApp::new().await;
            let perfume = app.seed_perfume("Random Walk", dec!(10.00), initial).await;
            let catalog = &app.state.services.catalog;
            let mut expected = initial;

            for delta in deltas {
                match catalog.adjust_stock(perfume.id, delta).await {
                    Ok(updated) => {
                        expected += delta;
                        assert_eq!(updated.stock, expected);
                    }
                    Err(ServiceError::ValidationError(_)) => assert_eq!(delta, 0),
                    Err(ServiceError::InsufficientStock(_)) => assert!(expected + delta < 0),
                    Err(other) => panic!("unexpected error {}", other),
                }
                let stock = app.stock_of(perfume.id).await;
                assert!(stock >= 0);
                assert_eq!(stock, expected);
            }
        });
    }
}
