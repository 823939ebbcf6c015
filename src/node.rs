//! Node service: the shared ledger plus the operations the HTTP surface and
//! the background miner drive.

use crate::blockchain::{Block, Blockchain, TraceEntry};
use crate::config::Config;
use crate::consensus::{Consensus, Resolution};
use crate::error::{ChainError, Result};
use crate::miner::{mine_proof, CancelToken, DEFAULT_DIFFICULTY};
use crate::sync::{normalize_peer_address, ChainResponse, ChainSource, HttpChainSource, PeerRegistry};
use crate::transaction::{Transaction, TransactionRequest};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Syncing,
    Ready,
}

#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub difficulty: usize,
    pub mining_timeout: Duration,
    pub peer_timeout: Duration,
    /// Recipient of mining rewards
    pub node_id: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_timeout: Duration::from_secs(120),
            peer_timeout: Duration::from_secs(5),
            node_id: random_node_id(),
        }
    }
}

impl NodeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            difficulty: config.miner.difficulty,
            mining_timeout: config.miner.timeout,
            peer_timeout: config.network.peer_timeout,
            node_id: config.miner.node_id.clone().unwrap_or_else(random_node_id),
        }
    }
}

/// Random 16-byte identity, hex encoded.
pub fn random_node_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiningStatus {
    pub is_mining: bool,
    pub blocks_mined: u64,
    pub difficulty: usize,
}

/// Last block as seen when a search started.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tip {
    index: u64,
    proof: u64,
    hash: String,
}

impl Tip {
    fn of(chain: &Blockchain) -> Result<Self> {
        let last = chain.last_block()?;
        Ok(Tip {
            index: last.index,
            proof: last.proof,
            hash: last.hash()?,
        })
    }
}

/// In-flight searches. Each `mine` call owns one token so a timeout only
/// stops its own worker, while a chain replacement stops all of them.
type InFlight = Arc<parking_lot::Mutex<Vec<CancelToken>>>;

struct InFlightGuard {
    in_flight: InFlight,
    token: CancelToken,
}

impl InFlightGuard {
    fn register(in_flight: &InFlight) -> Self {
        let token = CancelToken::new();
        in_flight.lock().push(token.clone());
        Self {
            in_flight: in_flight.clone(),
            token,
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().retain(|t| !t.same_as(&self.token));
    }
}

/// Node state shared between request handlers and background tasks
#[derive(Clone)]
pub struct Node {
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub peers: Arc<PeerRegistry>,
    pub state: Arc<RwLock<NodeState>>,
    source: Arc<dyn ChainSource>,
    settings: Arc<NodeSettings>,
    in_flight: InFlight,
    blocks_mined: Arc<AtomicU64>,
}

impl Node {
    pub fn new(blockchain: Blockchain, settings: NodeSettings, source: Arc<dyn ChainSource>) -> Self {
        Self {
            blockchain: Arc::new(RwLock::new(blockchain)),
            peers: Arc::new(PeerRegistry::new()),
            state: Arc::new(RwLock::new(NodeState::Booting)),
            source,
            settings: Arc::new(settings),
            in_flight: Arc::new(parking_lot::Mutex::new(Vec::new())),
            blocks_mined: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build a node with a fresh ledger, an HTTP peer client and the
    /// configured bootstrap peers. Unparseable bootstrap peers are skipped.
    pub fn from_config(config: &Config) -> Self {
        let settings = NodeSettings::from_config(config);
        let node = Self::new(
            Blockchain::new(settings.difficulty),
            settings,
            Arc::new(HttpChainSource::new()),
        );
        for peer in &config.network.bootstrap_peers {
            if let Err(e) = node.peers.register_peer(peer) {
                warn!(peer = %peer, error = %e, "ignoring bootstrap peer");
            }
        }
        node
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn node_id(&self) -> &str {
        &self.settings.node_id
    }

    pub async fn set_state(&self, state: NodeState) {
        let mut current = self.state.write().await;
        if *current != state {
            info!(from = ?*current, to = ?state, "node state changed");
            *current = state;
        }
    }

    pub async fn state(&self) -> NodeState {
        self.state.read().await.clone()
    }

    /// Validate and pool a transaction; returns the index of the block it
    /// will be sealed into.
    pub async fn submit_transaction(&self, request: TransactionRequest) -> Result<u64> {
        self.blockchain.write().await.submit_transaction(request)
    }

    /// Find a proof for the current tip and seal a block rewarding this node.
    ///
    /// The search runs without holding the ledger lock. If the tip moved in
    /// the meantime the proof is discarded with [`ChainError::StaleProof`].
    pub async fn mine(&self) -> Result<Block> {
        let tip = Tip::of(&*self.blockchain.read().await)?;

        let guard = InFlightGuard::register(&self.in_flight);
        debug!(last_index = tip.index, last_proof = tip.proof, "mining started");
        let proof = mine_proof(
            tip.proof,
            self.settings.difficulty,
            guard.token.clone(),
            self.settings.mining_timeout,
        )
        .await;
        drop(guard);
        let proof = proof?;

        let mut chain = self.blockchain.write().await;
        let block = commit_proof(&mut chain, &tip, proof, &self.settings.node_id)?;
        self.blocks_mined.fetch_add(1, Ordering::SeqCst);
        Ok(block)
    }

    /// Stop every in-flight search.
    pub fn cancel_mining(&self) -> usize {
        let in_flight = self.in_flight.lock();
        for token in in_flight.iter() {
            token.cancel();
        }
        in_flight.len()
    }

    pub fn is_mining(&self) -> bool {
        !self.in_flight.lock().is_empty()
    }

    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::Relaxed)
    }

    pub fn mining_status(&self) -> MiningStatus {
        MiningStatus {
            is_mining: self.is_mining(),
            blocks_mined: self.blocks_mined(),
            difficulty: self.settings.difficulty,
        }
    }

    pub async fn chain(&self) -> ChainResponse {
        ChainResponse::new(self.blockchain.read().await.blocks().to_vec())
    }

    pub async fn height(&self) -> usize {
        self.blockchain.read().await.len()
    }

    pub async fn pending_transactions(&self) -> Vec<Transaction> {
        self.blockchain
            .read()
            .await
            .mempool()
            .get_all_transactions()
    }

    pub async fn trace_batch(&self, batch_id: &str) -> Vec<TraceEntry> {
        self.blockchain.read().await.trace_batch(batch_id)
    }

    pub fn register_peer(&self, address: &str) -> Result<String> {
        self.peers.register_peer(address)
    }

    /// Register several peers; nothing is registered if any address is
    /// invalid. Returns the total number of known peers.
    pub fn register_peers(&self, addresses: &[String]) -> Result<usize> {
        let normalized = addresses
            .iter()
            .map(|address| normalize_peer_address(address))
            .collect::<Result<Vec<_>>>()?;
        for peer in &normalized {
            self.peers.register_peer(peer)?;
        }
        Ok(self.peers.len())
    }

    pub fn peer_list(&self) -> Vec<String> {
        self.peers.peers()
    }

    /// Run consensus against every registered peer. Replacing the local
    /// chain cancels in-flight mining, since its proofs target the old tip.
    pub async fn resolve_conflicts(&self) -> Resolution {
        let peers = self.peers.peers();
        let resolution = Consensus::resolve_conflicts(
            &self.blockchain,
            &peers,
            self.source.as_ref(),
            self.settings.peer_timeout,
        )
        .await;

        if resolution.replaced {
            let cancelled = self.cancel_mining();
            if cancelled > 0 {
                info!(cancelled, "cancelled mining after chain replacement");
            }
        }
        resolution
    }

    /// Mine in the background whenever transactions are pending.
    pub fn spawn_auto_miner(&self, interval: Duration) -> JoinHandle<()> {
        let node = self.clone();
        tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "auto miner started");
            loop {
                tokio::time::sleep(interval).await;

                if node.blockchain.read().await.mempool().is_empty() {
                    continue;
                }

                match node.mine().await {
                    Ok(block) => info!(
                        index = block.index,
                        transactions = block.transactions.len(),
                        "auto miner forged block"
                    ),
                    Err(e) if e.is_retryable() => debug!(error = %e, "auto mining interrupted"),
                    Err(e) => warn!(error = %e, "auto mining failed"),
                }
            }
        })
    }
}

/// Append the reward and seal, provided the tip is still the one the proof
/// was found for. Runs under the caller's write lock.
fn commit_proof(chain: &mut Blockchain, tip: &Tip, proof: u64, node_id: &str) -> Result<Block> {
    let current = Tip::of(chain)?;
    if current != *tip {
        warn!(
            expected_index = tip.index,
            current_index = current.index,
            "discarding stale proof"
        );
        return Err(ChainError::StaleProof);
    }
    chain.add_transaction(Transaction::reward(node_id))?;
    chain.seal_block(proof, Some(tip.hash.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::find_proof;
    use crate::transaction::SYSTEM_SENDER;
    use async_trait::async_trait;

    const TEST_DIFFICULTY: usize = 2;

    struct FixedPeer(ChainResponse);

    #[async_trait]
    impl ChainSource for FixedPeer {
        async fn fetch_chain(&self, _peer: &str) -> Result<ChainResponse> {
            Ok(self.0.clone())
        }
    }

    fn settings(difficulty: usize, mining_timeout: Duration) -> NodeSettings {
        NodeSettings {
            difficulty,
            mining_timeout,
            peer_timeout: Duration::from_millis(200),
            node_id: "node-a".to_string(),
        }
    }

    fn test_node(source: ChainResponse) -> Node {
        Node::new(
            Blockchain::new(TEST_DIFFICULTY),
            settings(TEST_DIFFICULTY, Duration::from_secs(20)),
            Arc::new(FixedPeer(source)),
        )
    }

    fn longer_chain(length: usize) -> Vec<Block> {
        let mut chain = Blockchain::new(TEST_DIFFICULTY);
        while chain.len() < length {
            let proof = find_proof(chain.last_block().unwrap().proof, TEST_DIFFICULTY);
            chain.seal_block(proof, None).unwrap();
        }
        chain.blocks().to_vec()
    }

    #[tokio::test]
    async fn test_mine_seals_pending_and_reward() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let node = test_node(ChainResponse::new(Vec::new()));
            let index = node
                .submit_transaction(TransactionRequest::new("farmer_1", "buyer_1", 500, "turmeric", 5))
                .await
                .unwrap();
            assert_eq!(index, 2);

            let block = node.mine().await.unwrap();
            assert_eq!(block.index, 2);
            assert_eq!(block.transactions.len(), 2);
            let reward = block.transactions.last().unwrap();
            assert_eq!(reward.sender, SYSTEM_SENDER);
            assert_eq!(reward.recipient, "node-a");

            assert!(node.pending_transactions().await.is_empty());
            assert_eq!(node.blocks_mined(), 1);
            assert!(!node.is_mining());
            assert!(node.blockchain.read().await.verify().is_ok());
        })
        .await
        .expect("test_mine_seals_pending_and_reward timed out");
    }

    #[tokio::test]
    async fn test_mine_with_empty_pool_forges_reward_block() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let node = test_node(ChainResponse::new(Vec::new()));
            let block = node.mine().await.unwrap();
            assert_eq!(block.transactions.len(), 1);
            assert!(block.transactions[0].is_reward());
        })
        .await
        .expect("test_mine_with_empty_pool_forges_reward_block timed out");
    }

    #[tokio::test]
    async fn test_mining_timeout_leaves_chain_untouched() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let node = Node::new(
                Blockchain::new(64),
                settings(64, Duration::from_millis(50)),
                Arc::new(FixedPeer(ChainResponse::new(Vec::new()))),
            );
            assert_eq!(node.mine().await.unwrap_err(), ChainError::MiningTimedOut);
            assert_eq!(node.height().await, 1);
            assert!(!node.is_mining());
            assert_eq!(node.blocks_mined(), 0);
        })
        .await
        .expect("test_mining_timeout_leaves_chain_untouched timed out");
    }

    #[tokio::test]
    async fn test_cancel_mining_interrupts_search() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let node = Node::new(
                Blockchain::new(64),
                settings(64, Duration::from_secs(60)),
                Arc::new(FixedPeer(ChainResponse::new(Vec::new()))),
            );
            let miner = node.clone();
            let search = tokio::spawn(async move { miner.mine().await });

            while !node.is_mining() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert_eq!(node.cancel_mining(), 1);
            assert_eq!(search.await.unwrap().unwrap_err(), ChainError::MiningCancelled);
            assert!(!node.is_mining());
        })
        .await
        .expect("test_cancel_mining_interrupts_search timed out");
    }

    #[test]
    fn test_commit_rejects_stale_tip() {
        let mut chain = Blockchain::new(TEST_DIFFICULTY);
        let tip = Tip::of(&chain).unwrap();
        let proof = find_proof(tip.proof, TEST_DIFFICULTY);
        chain.seal_block(proof, None).unwrap();

        let pending_before = chain.mempool().len();
        assert_eq!(
            commit_proof(&mut chain, &tip, proof, "node-a").unwrap_err(),
            ChainError::StaleProof
        );
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.mempool().len(), pending_before, "no reward on stale proof");
    }

    #[tokio::test]
    async fn test_resolve_adopts_longer_peer_chain_and_keeps_pool() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let node = test_node(ChainResponse::new(longer_chain(4)));
            node.register_peer("http://10.0.0.2:5000").unwrap();
            node.submit_transaction(TransactionRequest::new("farmer_1", "buyer_1", 5, "rice", 1))
                .await
                .unwrap();

            let resolution = node.resolve_conflicts().await;
            assert!(resolution.replaced);
            assert_eq!(resolution.adopted_from.as_deref(), Some("10.0.0.2:5000"));
            assert_eq!(node.height().await, 4);
            assert_eq!(node.pending_transactions().await.len(), 1);
        })
        .await
        .expect("test_resolve_adopts_longer_peer_chain_and_keeps_pool timed out");
    }

    #[test]
    fn test_register_peers_is_all_or_nothing() {
        let node = test_node(ChainResponse::new(Vec::new()));
        let err = node
            .register_peers(&["10.0.0.2:5000".to_string(), "".to_string()])
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidPeerAddress(_)));
        assert!(node.peer_list().is_empty());

        let total = node
            .register_peers(&["10.0.0.2:5000".to_string(), "http://10.0.0.3:5000".to_string()])
            .unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_auto_miner_seals_only_when_pool_is_non_empty() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let node = test_node(ChainResponse::new(Vec::new()));
            let handle = node.spawn_auto_miner(Duration::from_millis(10));

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(node.height().await, 1, "empty pool must not be mined");

            node.submit_transaction(TransactionRequest::new("farmer_1", "buyer_1", 5, "rice", 1))
                .await
                .unwrap();
            while node.height().await < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(node.pending_transactions().await.is_empty());
            handle.abort();
        })
        .await
        .expect("test_auto_miner_seals_only_when_pool_is_non_empty timed out");
    }

    #[test]
    fn test_random_node_id_shape() {
        let id = random_node_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_node_id());
    }
}
