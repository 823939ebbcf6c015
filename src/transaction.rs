//! Transaction types and request validation

pub mod types;
pub mod validation;

pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;

    fn turmeric_request() -> TransactionRequest {
        TransactionRequest::new("farmer_1", "buyer_1", 500, "turmeric", 5)
    }

    #[test]
    fn test_request_with_all_fields_is_accepted() {
        let tx = turmeric_request().into_transaction().unwrap();
        assert_eq!(tx.sender, "farmer_1");
        assert_eq!(tx.recipient, "buyer_1");
        assert_eq!(tx.amount, 500);
        assert_eq!(tx.crop_type, "turmeric");
        assert_eq!(tx.quantity, 5);
        assert!(tx.timestamp > 0);
        assert!(tx.supply_chain.is_none());
    }

    #[test]
    fn test_missing_fields_are_reported_by_name() {
        let mut req = turmeric_request();
        req.amount = None;
        req.crop_type = None;

        match req.into_transaction() {
            Err(ChainError::InvalidTransaction(msg)) => {
                assert!(msg.contains("amount"));
                assert!(msg.contains("crop_type"));
                assert!(!msg.contains("sender"));
            }
            other => panic!("expected InvalidTransaction, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_sender_counts_as_missing() {
        let mut req = turmeric_request();
        req.sender = Some("   ".to_string());
        assert!(matches!(
            req.into_transaction(),
            Err(ChainError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_reserved_reward_sender_is_rejected() {
        let req = TransactionRequest::new(SYSTEM_SENDER, "buyer_1", 10, "rice", 1);
        assert!(matches!(
            req.into_transaction(),
            Err(ChainError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_camel_case_request_fields() {
        let json = serde_json::json!({
            "sender": "farmer_1",
            "recipient": "buyer_1",
            "amount": 500,
            "cropType": "turmeric",
            "quantity": 5,
            "supplyChain": {
                "batch_id": "B-001",
                "farmer_id": "farmer_1",
                "product_name": "Turmeric",
                "quantity": "50kg"
            }
        });
        let req: TransactionRequest = serde_json::from_value(json).unwrap();
        let tx = req.into_transaction().unwrap();
        assert_eq!(tx.crop_type, "turmeric");
        assert_eq!(tx.batch_id(), Some("B-001"));

        let sealed = serde_json::to_value(&tx).unwrap();
        assert_eq!(sealed["supply_chain"]["quantity"], "50kg");
        assert_eq!(sealed["supply_chain"]["product_name"], "Turmeric");
        assert_eq!(tx.supply_chain.unwrap().quality_grade, "standard");
    }

    #[test]
    fn test_fractional_amount_is_rejected() {
        let json = serde_json::json!({
            "sender": "farmer_1",
            "recipient": "buyer_1",
            "amount": 99.5,
            "crop_type": "turmeric",
            "quantity": 5
        });
        assert!(serde_json::from_value::<TransactionRequest>(json).is_err());
    }

    #[test]
    fn test_quality_score_accepts_numbers() {
        let record: SupplyChainRecord =
            serde_json::from_value(serde_json::json!({ "batch_id": "B-7", "quality_score": 8.5 }))
                .unwrap();
        assert_eq!(record.quality_score, "8.5");
        assert_eq!(record.quantity, "");

        let record: SupplyChainRecord =
            serde_json::from_value(serde_json::json!({ "quantity": 50 })).unwrap();
        assert_eq!(record.quantity, "50");

        let record: SupplyChainRecord =
            serde_json::from_value(serde_json::json!({ "quality_score": "A+" })).unwrap();
        assert_eq!(record.quality_score, "A+");
        assert!(serde_json::from_value::<SupplyChainRecord>(
            serde_json::json!({ "quality_score": [1] })
        )
        .is_err());
    }

    #[test]
    fn test_reward_transaction() {
        let tx = Transaction::reward("node-a");
        assert!(tx.is_reward());
        assert_eq!(tx.sender, SYSTEM_SENDER);
        assert_eq!(tx.recipient, "node-a");
        assert_eq!(tx.amount, MINING_REWARD);
    }

    #[test]
    fn test_oversized_transaction_fails() {
        let mut record = SupplyChainRecord::new("B-big", "farmer_1");
        record.processing_steps = vec!["x".repeat(1024); 128];
        let req = turmeric_request().with_supply_chain(record);
        assert!(matches!(
            req.into_transaction(),
            Err(ChainError::InvalidTransaction(_))
        ));
    }
}
