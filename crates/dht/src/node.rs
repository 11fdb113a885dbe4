//! The ring node: routing, ring maintenance and key ownership.
//!
//! A [`Node`] owns its [`RingPointers`] and [`KeyValueStore`] exclusively.
//! Other nodes only affect them through the requests served by
//! [`Node::handle`]. Locks are never held across an `.await`; when both
//! are needed the pointer lock is taken before the store lock.
//!
//! Key operations are only served for keys in `(predecessor, self]`, checked
//! under the pointer lock so they are atomic with the range extraction in
//! [`Node::notify`]. On the receiving side the handoff gate keeps key
//! operations out while a notify is in flight and its batch not yet
//! installed.

use crate::client::{NotifyOutcome, RpcClient};
use crate::config::NodeConfig;
use crate::error::{DhtError, Result};
use crate::pointers::{Membership, RingPointers};
use crate::protocol::{Envelope, NodeSnapshot, Reply, Request, Response};
use crate::store::KeyValueStore;
use crate::transport::Transport;
use corelib::{Id, IdentifierSpace, LogicalClock, NodeAddr, NodeInfo, TableRep};
use metrics::counter;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct Node {
    info: NodeInfo,
    space: IdentifierSpace,
    config: NodeConfig,
    pointers: Mutex<RingPointers>,
    store: KeyValueStore,
    /// Held for writing from sending `notify` until its batch is installed.
    handoff: RwLock<()>,
    clock: Arc<LogicalClock>,
    client: RpcClient,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("info", &self.info)
            .field("bits", &self.space.bits())
            .finish()
    }
}

impl Node {
    /// Builds a node that is not yet part of any ring.
    ///
    /// Call [`create`](Self::create) or [`join`](Self::join) next.
    pub fn new(info: NodeInfo, config: NodeConfig, transport: Arc<dyn Transport>) -> Result<Arc<Self>> {
        Self::with_clock(info, config, transport, Arc::new(LogicalClock::new()))
    }

    /// Like [`new`](Self::new), resuming from an existing clock.
    pub fn with_clock(
        info: NodeInfo,
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<LogicalClock>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let space = config.space()?;
        let info = NodeInfo::checked(&space, info.id, info.addr)?;
        let client = RpcClient::new(transport, Arc::clone(&clock), config.rpc_timeout);
        Ok(Arc::new(Self {
            pointers: Mutex::new(RingPointers::solitary(&info, space.bits())),
            info,
            space,
            config,
            store: KeyValueStore::new(),
            handoff: RwLock::new(()),
            clock,
            client,
        }))
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn id(&self) -> Id {
        self.info.id
    }

    pub fn space(&self) -> &IdentifierSpace {
        &self.space
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn successor(&self) -> NodeInfo {
        self.pointers.lock().successor.clone()
    }

    pub fn predecessor(&self) -> Option<NodeInfo> {
        self.pointers.lock().predecessor.clone()
    }

    pub fn fingers(&self) -> Vec<NodeInfo> {
        self.pointers.lock().fingers.entries().to_vec()
    }

    pub fn membership(&self) -> Membership {
        self.pointers.lock().membership
    }

    /// The local store as a batch owned by this node.
    pub fn bindings(&self) -> TableRep {
        TableRep::with_entries(self.info.clone(), self.store.rows())
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let pointers = self.pointers.lock().clone();
        NodeSnapshot {
            node: self.info.clone(),
            predecessor: pointers.predecessor,
            successor: pointers.successor,
            fingers: pointers.fingers.entries().to_vec(),
            bits: self.space.bits(),
            clock: self.clock.now(),
            keys: self.store.len(),
            membership: pointers.membership,
        }
    }

    // ------------------------------------------------------------------
    // Ring membership
    // ------------------------------------------------------------------

    /// Starts a new ring containing only this node.
    pub fn create(&self) {
        let mut pointers = self.pointers.lock();
        *pointers = RingPointers::solitary(&self.info, self.space.bits());
        pointers.membership = Membership::Stable;
        info!(node = %self.info, "created ring");
    }

    /// Joins the ring that `bootstrap` belongs to.
    ///
    /// Resolves our successor through `bootstrap`, then runs one
    /// stabilization round so the successor hands over our key range.
    pub async fn join(&self, bootstrap: &NodeAddr) -> Result<()> {
        let successor = self
            .client
            .find_successor(bootstrap, self.info.id)
            .await
            .map_err(|e| e.into_failed("join"))?;
        if successor.id == self.info.id && successor.addr != self.info.addr {
            warn!(node = %self.info, taken_by = %successor, "identifier already in use");
            return Err(DhtError::Failed("join".into()));
        }
        {
            let mut pointers = self.pointers.lock();
            *pointers = RingPointers::solitary(&self.info, self.space.bits());
            pointers.set_successor(successor.clone());
        }
        info!(node = %self.info, via = %bootstrap, successor = %successor, "joined ring");
        if let Err(e) = self.stabilize().await {
            warn!(node = %self.info, error = %e, "initial stabilization after join failed");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Routing primitive: the finger closest to, but strictly before, `id`.
    pub fn closest_preceding_finger(&self, id: Id) -> NodeInfo {
        self.pointers
            .lock()
            .fingers
            .closest_preceding(&self.space, &self.info, id)
    }

    /// The node owning `id`.
    ///
    /// Walks the ring iteratively: each step asks the current hop whether
    /// `id` falls between it and its successor, and otherwise jumps to the
    /// hop's closest preceding finger. A hop answering with itself makes no
    /// progress, so the walk advances to that hop's successor instead. On a
    /// remote failure the walk restarts once from our own successor.
    pub async fn find_successor(&self, id: Id) -> Result<NodeInfo> {
        counter!("chord_lookups_total").increment(1);
        let mut hop = self.info.clone();
        let mut hop_succ = self.successor();
        let mut fell_back = false;
        let mut hops: u64 = 0;

        while !self.space.in_half_open(hop.id, id, hop_succ.id) {
            if hops as usize >= self.config.max_lookup_hops {
                counter!("chord_lookup_failures_total").increment(1);
                warn!(node = %self.info, %id, hops, "lookup exceeded hop limit");
                return Err(DhtError::Failed("find".into()));
            }
            hops += 1;

            match self.step(&hop, &hop_succ, id).await {
                Ok((next, next_succ)) => {
                    hop = next;
                    hop_succ = next_succ;
                }
                Err(e) if !fell_back => {
                    fell_back = true;
                    let own = self.successor();
                    warn!(node = %self.info, %id, at = %hop, error = %e, "lookup hop failed, retrying from successor");
                    if own == self.info {
                        counter!("chord_lookup_failures_total").increment(1);
                        return Err(e.into_failed("find"));
                    }
                    match self.succ_of(&own).await {
                        Ok(own_succ) => {
                            hop = own;
                            hop_succ = own_succ;
                        }
                        Err(e) => {
                            counter!("chord_lookup_failures_total").increment(1);
                            return Err(e.into_failed("find"));
                        }
                    }
                }
                Err(e) => {
                    counter!("chord_lookup_failures_total").increment(1);
                    return Err(e.into_failed("find"));
                }
            }
        }

        counter!("chord_lookup_hops_total").increment(hops);
        debug!(node = %self.info, %id, owner = %hop_succ, hops, "lookup resolved");
        Ok(hop_succ)
    }

    /// One routing step from `hop` towards `id`.
    async fn step(&self, hop: &NodeInfo, hop_succ: &NodeInfo, id: Id) -> Result<(NodeInfo, NodeInfo)> {
        let mut next = self.closest_preceding_finger_of(hop, id).await?;
        if next == *hop {
            next = hop_succ.clone();
        }
        let next_succ = self.succ_of(&next).await?;
        Ok((next, next_succ))
    }

    // Self-addressed calls are served locally rather than over the transport.

    async fn succ_of(&self, node: &NodeInfo) -> Result<NodeInfo> {
        if *node == self.info {
            Ok(self.successor())
        } else {
            self.client.get_succ(node).await
        }
    }

    async fn pred_of(&self, node: &NodeInfo) -> Result<Option<NodeInfo>> {
        if *node == self.info {
            Ok(self.predecessor())
        } else {
            self.client.get_pred(node).await
        }
    }

    async fn closest_preceding_finger_of(&self, node: &NodeInfo, id: Id) -> Result<NodeInfo> {
        if *node == self.info {
            Ok(self.closest_preceding_finger(id))
        } else {
            self.client.closest_preceding_finger(node, id).await
        }
    }

    // ------------------------------------------------------------------
    // Notify and key handoff
    // ------------------------------------------------------------------

    /// Handles a candidate claiming to be our predecessor.
    ///
    /// Accepts when we have no predecessor, when the candidate already is our
    /// predecessor, or when it lies strictly between the current predecessor
    /// and us. On acceptance the keys the candidate now owns are removed
    /// from the store and returned. `None` means rejected: a benign race
    /// with a closer node.
    pub fn notify(&self, candidate: &NodeInfo) -> Option<TableRep> {
        if candidate.id == self.info.id && candidate.addr != self.info.addr {
            warn!(node = %self.info, %candidate, "rejecting notify from node with our id");
            return None;
        }

        let mut pointers = self.pointers.lock();
        let accept = match &pointers.predecessor {
            None => true,
            Some(pred) if pred == candidate => true,
            Some(pred) => self.space.between(pred.id, candidate.id, self.info.id),
        };
        if !accept {
            debug!(node = %self.info, %candidate, "notify rejected");
            return None;
        }

        let previous = pointers.predecessor.replace(candidate.clone());
        // Extract under the pointer lock: the range and the predecessor
        // change together.
        let moved = match &previous {
            Some(old) if old != candidate => self.store.extract(|key| {
                self.space
                    .in_half_open(old.id, self.space.hash_key(key), candidate.id)
            }),
            // Re-notify or no previous predecessor: hand over everything
            // outside our range. Keys owned by neither node keep moving
            // counter-clockwise on later cycles until they reach their owner.
            _ => self.store.extract(|key| {
                !self
                    .space
                    .in_half_open(candidate.id, self.space.hash_key(key), self.info.id)
            }),
        };
        drop(pointers);

        if previous.as_ref() != Some(candidate) {
            info!(node = %self.info, predecessor = %candidate, keys = moved.len(), "accepted new predecessor");
        }
        if !moved.is_empty() {
            counter!("chord_keys_transferred_total").increment(moved.len() as u64);
        }
        Some(TableRep::with_entries(self.info.clone(), moved))
    }

    async fn notify_peer(&self, successor: &NodeInfo) -> Result<NotifyOutcome> {
        if *successor == self.info {
            return Ok(match self.notify(&self.info) {
                Some(batch) => NotifyOutcome::Accepted(batch),
                None => NotifyOutcome::Rejected,
            });
        }
        self.client
            .notify(successor, TableRep::new(self.info.clone()))
            .await
    }

    fn install(&self, batch: TableRep) {
        let rows = batch.len();
        let added = self.store.install(batch.entries);
        if rows > 0 {
            info!(node = %self.info, from = %batch.owner, rows, added, "installed handoff batch");
        }
    }

    // ------------------------------------------------------------------
    // Stabilization
    // ------------------------------------------------------------------

    /// Adopts a closer successor if one has appeared, then notifies the
    /// successor that we are its predecessor.
    pub async fn stabilize(&self) -> Result<()> {
        let successor = self.successor();
        let candidate = self.pred_of(&successor).await?;
        if let Some(candidate) = candidate {
            if self.space.between(self.info.id, candidate.id, successor.id) {
                let mut pointers = self.pointers.lock();
                if pointers.successor == successor {
                    pointers.set_successor(candidate.clone());
                    info!(node = %self.info, successor = %candidate, "adopted closer successor");
                }
            }
        }

        let successor = self.successor();
        let _handoff = self.handoff.write().await;
        match self.notify_peer(&successor).await? {
            NotifyOutcome::Accepted(batch) => {
                self.install(batch);
                let mut pointers = self.pointers.lock();
                if pointers.membership == Membership::Joining {
                    pointers.membership = Membership::Stable;
                    info!(node = %self.info, "membership stable");
                }
            }
            NotifyOutcome::Rejected => {
                debug!(node = %self.info, %successor, "successor kept its predecessor");
            }
        }
        Ok(())
    }

    /// Replaces a dead successor with the nearest live finger, or self.
    pub async fn check_successor(&self) {
        let successor = self.successor();
        if successor == self.info || !self.client.is_failed(&successor.addr).await {
            return;
        }
        warn!(node = %self.info, %successor, "successor unreachable");

        let candidates = {
            let mut pointers = self.pointers.lock();
            pointers.fingers.evict(&successor, &self.info);
            pointers.fingers.distinct_peers(&self.info)
        };
        let mut replacement = self.info.clone();
        for candidate in candidates {
            if !self.client.is_failed(&candidate.addr).await {
                replacement = candidate;
                break;
            }
        }

        let mut pointers = self.pointers.lock();
        if pointers.successor == successor {
            pointers.set_successor(replacement.clone());
            info!(node = %self.info, successor = %replacement, "replaced failed successor");
        }
        if pointers.predecessor.as_ref() == Some(&successor) {
            pointers.predecessor = None;
        }
    }

    /// Forgets a predecessor that no longer answers, so a live node can
    /// claim the slot through `notify`.
    pub async fn check_predecessor(&self) {
        let predecessor = self.predecessor();
        let Some(predecessor) = predecessor else {
            return;
        };
        if predecessor == self.info || !self.client.is_failed(&predecessor.addr).await {
            return;
        }
        let mut pointers = self.pointers.lock();
        if pointers.predecessor.as_ref() == Some(&predecessor) {
            pointers.predecessor = None;
            warn!(node = %self.info, %predecessor, "predecessor failed, cleared");
        }
    }

    /// Refreshes the next `fingers_per_cycle` finger entries.
    pub async fn fix_fingers(&self) -> Result<()> {
        let indices = self
            .pointers
            .lock()
            .next_finger_indices(self.config.fingers_per_cycle);
        for index in indices {
            self.fix_finger(index).await?;
        }
        Ok(())
    }

    /// Refreshes every finger entry.
    pub async fn fix_all_fingers(&self) -> Result<()> {
        for index in 1..usize::from(self.space.bits()) {
            self.fix_finger(index).await?;
        }
        Ok(())
    }

    async fn fix_finger(&self, index: usize) -> Result<()> {
        let start = self.space.finger_start(self.info.id, index as u8);
        let finger = self.find_successor(start).await?;
        let mut pointers = self.pointers.lock();
        if pointers.fingers.get(index) != Some(&finger) {
            debug!(node = %self.info, index, %finger, "finger updated");
            pointers.fingers.set(index, finger);
        }
        Ok(())
    }

    /// One full maintenance cycle. Failures are logged, never escalated:
    /// the next cycle simply tries again.
    pub async fn run_cycle(&self) {
        counter!("chord_stabilize_cycles_total").increment(1);
        self.check_successor().await;
        self.check_predecessor().await;
        if let Err(e) = self.stabilize().await {
            counter!("chord_stabilize_failures_total").increment(1);
            warn!(node = %self.info, error = %e, "stabilize failed");
        }
        if let Err(e) = self.fix_fingers().await {
            warn!(node = %self.info, error = %e, "fix fingers failed");
        }
    }

    // ------------------------------------------------------------------
    // Key/value operations
    // ------------------------------------------------------------------

    /// Values bound to `key`, wherever it lives on the ring.
    pub async fn get(&self, key: &str) -> Result<Vec<String>> {
        self.route(
            "get",
            key,
            || self.get_local(key),
            move |owner| async move { self.client.get(&owner, key).await },
        )
        .await
    }

    pub async fn add(&self, key: &str, val: &str) -> Result<()> {
        self.route(
            "add",
            key,
            || self.add_local(key, val),
            move |owner| async move { self.client.add(&owner, key, val).await },
        )
        .await
    }

    pub async fn delete(&self, key: &str, val: &str) -> Result<()> {
        self.route(
            "delete",
            key,
            || self.delete_local(key, val),
            move |owner| async move { self.client.delete(&owner, key, val).await },
        )
        .await
    }

    async fn owner_of(&self, key: &str) -> Result<NodeInfo> {
        self.find_successor(self.space.hash_key(key)).await
    }

    /// Runs a key operation at the owner of `key`.
    ///
    /// A stale owner answers `NotOwner`: a handoff moved the key to a node
    /// between the lookup's last hop and that owner, so the operation is
    /// retried at its predecessor until one accepts.
    async fn route<T, L, R, Fut>(&self, op: &'static str, key: &str, local: L, remote: R) -> Result<T>
    where
        L: Fn() -> T,
        R: Fn(NodeInfo) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut owner = self.owner_of(key).await?;
        for _ in 0..self.config.max_lookup_hops {
            let attempt = if owner == self.info {
                self.apply_owned(key, &local)
                    .await
                    .ok_or_else(|| DhtError::NotOwner(self.info.addr.clone()))
            } else {
                remote(owner.clone()).await
            };
            match attempt {
                Ok(value) => return Ok(value),
                Err(DhtError::NotOwner(_)) => {
                    let moved_from = owner;
                    owner = match self.pred_of(&moved_from).await.map_err(|e| e.into_failed(op))? {
                        Some(pred) => pred,
                        None => self.owner_of(key).await?,
                    };
                    debug!(node = %self.info, op, key, from = %moved_from, to = %owner, "key moved, retrying");
                }
                Err(e) => return Err(e.into_failed(op)),
            }
        }
        warn!(node = %self.info, op, key, "gave up chasing moved key");
        Err(DhtError::Failed(op.to_string()))
    }

    /// Applies `op` if `key` is ours, atomically with any range extraction.
    ///
    /// `None` means the key is outside `(predecessor, self]`. Without a
    /// predecessor every key is ours.
    async fn apply_owned<T>(&self, key: &str, op: impl FnOnce() -> T) -> Option<T> {
        let _handoff = self.handoff.read().await;
        let id = self.space.hash_key(key);
        let pointers = self.pointers.lock();
        let owned = match &pointers.predecessor {
            None => true,
            Some(pred) => self.space.in_half_open(pred.id, id, self.info.id),
        };
        owned.then(op)
    }

    // The `_local` operations bypass the ownership check; they act on
    // whatever the store holds.

    pub fn get_local(&self, key: &str) -> Vec<String> {
        self.store.get(key)
    }

    pub fn add_local(&self, key: &str, val: &str) {
        if self.store.add(key, val) {
            debug!(node = %self.info, key, val, "binding added");
        }
    }

    pub fn delete_local(&self, key: &str, val: &str) {
        if self.store.delete(key, val) {
            debug!(node = %self.info, key, val, "binding deleted");
        }
    }

    // ------------------------------------------------------------------
    // Inbound requests
    // ------------------------------------------------------------------

    /// Serves one request from a peer, applying the clock discipline on
    /// both edges.
    pub async fn handle(&self, request: Envelope<Request>) -> Envelope<Response> {
        self.clock.advance(Some(request.time));
        let op = request.body.op();
        let response = self.dispatch(request.body).await;
        if response.status.is_failure() {
            debug!(node = %self.info, op, status = ?response.status, "request failed");
        }
        Envelope::new(self.clock.advance(None), response)
    }

    async fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::Info => Response::ok(Reply::Info(self.snapshot())),
            Request::Pred => Response::ok(Reply::MaybeNode(self.predecessor())),
            Request::Succ => Response::ok(Reply::Node(self.successor())),
            Request::Finger { id } => {
                if !self.space.contains(id) {
                    return Response::bad_request(format!("id {} outside ring", id));
                }
                Response::ok(Reply::Node(self.closest_preceding_finger(id)))
            }
            Request::Find { id } => {
                if !self.space.contains(id) {
                    return Response::bad_request(format!("id {} outside ring", id));
                }
                match self.find_successor(id).await {
                    Ok(node) => Response::ok(Reply::Node(node)),
                    Err(e) => Response::internal(e.to_string()),
                }
            }
            Request::Notify(pred_db) => {
                if !self.space.contains(pred_db.owner.id) {
                    return Response::bad_request(format!("id {} outside ring", pred_db.owner.id));
                }
                match self.notify(&pred_db.owner) {
                    Some(batch) => Response::ok(Reply::Table(batch)),
                    None => Response::not_modified(),
                }
            }
            Request::Get { key } => match self.apply_owned(&key, || self.get_local(&key)).await {
                Some(vals) => Response::ok(Reply::Values(vals)),
                None => Response::not_owner(),
            },
            Request::Add { key, val } => match self.apply_owned(&key, || self.add_local(&key, &val)).await {
                Some(()) => Response::ok(Reply::Empty),
                None => Response::not_owner(),
            },
            Request::Delete { key, val } => {
                match self.apply_owned(&key, || self.delete_local(&key, &val)).await {
                    Some(()) => Response::ok(Reply::Empty),
                    None => Response::not_owner(),
                }
            }
        }
    }
}

