use crate::blockchain::core::chain::Block;
use crate::miner::valid_proof;
use thiserror::Error;
use tracing::debug;

/// The first rule a candidate chain breaks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainViolation {
    #[error("block at position {position} has index {found}")]
    UnexpectedIndex { position: usize, found: u64 },
    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: u64 },
    #[error("block {index} carries an invalid proof of work")]
    InvalidProof { index: u64 },
    #[error("block {index} could not be hashed: {reason}")]
    Unhashable { index: u64, reason: String },
}

/// Walk `chain` from its second block, checking every adjacent pair for
/// hash linkage and proof validity. The genesis block is trusted as-is;
/// empty and genesis-only chains are valid.
pub fn check_chain(chain: &[Block], difficulty: usize) -> Result<(), ChainViolation> {
    for (position, pair) in chain.windows(2).enumerate() {
        let (prev, curr) = (&pair[0], &pair[1]);

        let expected_index = position as u64 + 2;
        if curr.index != expected_index {
            return Err(ChainViolation::UnexpectedIndex {
                position: position + 1,
                found: curr.index,
            });
        }

        let prev_hash = prev.hash().map_err(|e| ChainViolation::Unhashable {
            index: prev.index,
            reason: e.to_string(),
        })?;
        if curr.previous_hash != prev_hash {
            return Err(ChainViolation::BrokenLink { index: curr.index });
        }

        if !valid_proof(prev.proof, curr.proof, difficulty) {
            return Err(ChainViolation::InvalidProof { index: curr.index });
        }
    }
    Ok(())
}

/// Boolean form of [`check_chain`].
pub fn is_valid_chain(chain: &[Block], difficulty: usize) -> bool {
    match check_chain(chain, difficulty) {
        Ok(()) => true,
        Err(violation) => {
            debug!(%violation, length = chain.len(), "chain failed validation");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Blockchain;
    use crate::miner::find_proof;
    use crate::transaction::TransactionRequest;

    const TEST_DIFFICULTY: usize = 2;

    fn chain_of(length: usize) -> Vec<Block> {
        let mut ledger = Blockchain::new(TEST_DIFFICULTY);
        while ledger.len() < length {
            let n = ledger.len() as u64;
            ledger
                .submit_transaction(TransactionRequest::new(
                    format!("farmer_{}", n),
                    "buyer_1",
                    100 * n,
                    "turmeric",
                    n,
                ))
                .unwrap();
            let proof = find_proof(ledger.last_block().unwrap().proof, TEST_DIFFICULTY);
            ledger.seal_block(proof, None).unwrap();
        }
        ledger.blocks().to_vec()
    }

    #[test]
    fn test_trivial_chains_are_valid() {
        assert!(is_valid_chain(&[], TEST_DIFFICULTY));
        assert!(is_valid_chain(&[Block::genesis()], TEST_DIFFICULTY));
    }

    #[test]
    fn test_sealed_chain_is_valid() {
        assert!(is_valid_chain(&chain_of(5), TEST_DIFFICULTY));
    }

    #[test]
    fn test_tampered_amount_breaks_link() {
        let mut chain = chain_of(4);
        chain[1].transactions[0].amount += 1;
        assert_eq!(
            check_chain(&chain, TEST_DIFFICULTY),
            Err(ChainViolation::BrokenLink { index: 3 })
        );
    }

    #[test]
    fn test_every_non_tip_field_is_covered() {
        let base = chain_of(4);
        let mutations: Vec<Box<dyn Fn(&mut Block)>> = vec![
            Box::new(|b: &mut Block| b.timestamp += 1),
            Box::new(|b: &mut Block| b.previous_hash.push('0')),
            Box::new(|b: &mut Block| b.transactions[0].recipient.push('x')),
            Box::new(|b: &mut Block| b.transactions[0].crop_type = "rice".to_string()),
            Box::new(|b: &mut Block| b.transactions[0].quantity += 1),
            Box::new(|b: &mut Block| b.transactions[0].timestamp += 1),
            Box::new(|b: &mut Block| b.transactions.clear()),
        ];
        for (i, mutate) in mutations.iter().enumerate() {
            for target in 1..base.len() - 1 {
                let mut chain = base.clone();
                mutate(&mut chain[target]);
                assert!(
                    !is_valid_chain(&chain, TEST_DIFFICULTY),
                    "mutation {} on block {} went unnoticed",
                    i,
                    target + 1
                );
            }
        }
    }

    #[test]
    fn test_forged_proof_is_rejected() {
        let mut chain = chain_of(3);
        let tip = chain.len() - 1;
        let last_proof = chain[tip - 1].proof;
        let mut forged = chain[tip].proof + 1;
        while valid_proof(last_proof, forged, TEST_DIFFICULTY) {
            forged += 1;
        }
        chain[tip].proof = forged;
        assert_eq!(
            check_chain(&chain, TEST_DIFFICULTY),
            Err(ChainViolation::InvalidProof { index: 3 })
        );
    }

    #[test]
    fn test_out_of_order_index_is_rejected() {
        let mut chain = chain_of(3);
        chain[2].index = 7;
        assert!(matches!(
            check_chain(&chain, TEST_DIFFICULTY),
            Err(ChainViolation::UnexpectedIndex { position: 2, found: 7 })
        ));
    }

    #[test]
    fn test_validation_respects_difficulty() {
        let chain = chain_of(3);
        // Proofs found at difficulty 2 almost never satisfy difficulty 6.
        let stricter = chain
            .windows(2)
            .all(|w| valid_proof(w[0].proof, w[1].proof, 6));
        assert_eq!(is_valid_chain(&chain, 6), stricter);
    }
}
