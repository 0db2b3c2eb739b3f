//! Parallel determinized search.
//!
//! Worker threads repeat sample → filter → synchronize → playout until
//! cancelled, sharing one information-set tree. A deadline watcher
//! fires the cooperative cancellation token after the configured
//! duration, a progress task emits periodic events, and evaluation of
//! the finished tree runs under the engine's aggregation lock.

use crate::backup::{BackupModel, Evaluator};
use crate::oracle::OracleProvider;
use crate::sampler::Sampler;
use crate::tree::{Node, Role, Tree};
use crate::world::World;
use bridge_core::game::GameState;
use bridge_core::model::card::Card;
use bridge_core::model::player::{Seat, Side};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::rngs::{SmallRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_SEED: u64 = 0x5EED_CA2D;
const MIN_DURATION_MS: u64 = 250;
const MIN_INTERVAL_MS: u64 = 50;
const MAX_DEPTH: u8 = 3;

/// Process-wide defaults, read once (`MDB_*` overrides).
struct EnvDefaults {
    threads: Option<usize>,
    seed: Option<u64>,
}

static ENV_DEFAULTS: Lazy<EnvDefaults> = Lazy::new(|| EnvDefaults {
    threads: std::env::var("MDB_SEARCH_THREADS")
        .ok()
        .and_then(|raw| raw.parse().ok()),
    seed: std::env::var("MDB_SEARCH_SEED")
        .ok()
        .and_then(|raw| raw.parse().ok()),
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Worker thread count, at least one.
    pub threads: usize,
    /// Optional cap on total iterations across a search.
    pub max_iterations: Option<u64>,
    /// Master RNG seed; fixed by default so single-threaded runs repeat.
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threads: ENV_DEFAULTS.threads.unwrap_or(4).max(1),
            max_iterations: None,
            seed: ENV_DEFAULTS.seed.unwrap_or(DEFAULT_SEED),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub duration: Duration,
    pub interval: Duration,
    pub depth: u8,
}

impl SearchLimits {
    /// Clamp to the supported ranges: duration at least 250 ms, progress
    /// interval at least 50 ms but never past the duration, simulation
    /// depth in 1..=3.
    pub fn new(duration_ms: u64, interval_ms: u64, depth: u8) -> Self {
        let duration_ms = duration_ms.max(MIN_DURATION_MS);
        let interval_ms = interval_ms.max(MIN_INTERVAL_MS).min(duration_ms);
        Self {
            duration: Duration::from_millis(duration_ms),
            interval: Duration::from_millis(interval_ms),
            depth: depth.clamp(1, MAX_DEPTH),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Progress { iterations: u64, elapsed: Duration },
    Completed { iterations: u64, elapsed: Duration },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no game attached")]
    NoGame,
    #[error("a search is already running")]
    Busy,
    #[error("no search to continue or evaluate")]
    NoSearch,
    #[error("no iterations recorded yet")]
    NoData,
}

/// Everything a search run needs, frozen at search start. The acting
/// seat in particular is captured here: roles are derived against the
/// game's original leader for the whole run.
struct SearchContext {
    sampler: Sampler,
    tree: Arc<Tree>,
    depth: u8,
    root_seat: Seat,
    root_side: Side,
    declarer_side: Side,
    required_tricks: u8,
}

impl SearchContext {
    fn from_game(game: &GameState, depth: u8) -> Self {
        let root_seat = game.leader();
        Self {
            sampler: Sampler::new(game),
            tree: Arc::new(Tree::new()),
            depth,
            root_seat,
            root_side: root_seat.side(),
            declarer_side: game.declarer().side(),
            required_tricks: game.contract().required_tricks(),
        }
    }

    fn role_of(&self, seat: Seat) -> Role {
        if seat == self.root_seat {
            Role::Actor
        } else if seat.side() == self.root_side {
            Role::Partner
        } else {
            Role::Opponent
        }
    }
}

struct EngineShared {
    provider: Arc<dyn OracleProvider>,
    game: Mutex<Option<GameState>>,
    session: Mutex<Option<Arc<SearchContext>>>,
    iterations: AtomicU64,
    searching: AtomicBool,
    cancel: Mutex<Arc<AtomicBool>>,
    elapsed_ms: AtomicU64,
    master_rng: Mutex<StdRng>,
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
    aggregate: Mutex<()>,
}

impl EngineShared {
    fn emit(&self, event: EngineEvent) {
        self.subscribers
            .lock()
            .retain(|sender| sender.send(event).is_ok());
    }
}

pub struct SearchEngine {
    config: SearchConfig,
    inner: Arc<EngineShared>,
}

impl SearchEngine {
    pub fn new(config: SearchConfig, provider: Arc<dyn OracleProvider>) -> Self {
        let seed = config.seed;
        Self {
            config,
            inner: Arc::new(EngineShared {
                provider,
                game: Mutex::new(None),
                session: Mutex::new(None),
                iterations: AtomicU64::new(0),
                searching: AtomicBool::new(false),
                cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
                elapsed_ms: AtomicU64::new(0),
                master_rng: Mutex::new(StdRng::seed_from_u64(seed)),
                subscribers: Mutex::new(Vec::new()),
                aggregate: Mutex::new(()),
            }),
        }
    }

    /// Attach the position to analyze, dropping any previous session.
    pub fn attach(&self, game: GameState) {
        *self.inner.game.lock() = Some(game);
        *self.inner.session.lock() = None;
        self.inner.iterations.store(0, Ordering::SeqCst);
    }

    pub fn is_searching(&self) -> bool {
        self.inner.searching.load(Ordering::SeqCst)
    }

    pub fn iterations(&self) -> u64 {
        self.inner.iterations.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.inner.elapsed_ms.load(Ordering::SeqCst))
    }

    /// Events arrive on the returned channel; a dropped receiver is
    /// pruned on the next emission.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (sender, receiver) = mpsc::channel();
        self.inner.subscribers.lock().push(sender);
        receiver
    }

    pub fn cancel(&self) {
        self.inner.cancel.lock().store(true, Ordering::SeqCst);
    }

    /// Block until the running search (if any) has completed.
    pub fn wait(&self) {
        while self.is_searching() {
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Fresh search: new sampler, new tree, iteration counter zeroed.
    pub fn search(&self, limits: SearchLimits) -> Result<(), EngineError> {
        if self.inner.searching.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Busy);
        }
        let context = match self.inner.game.lock().as_ref() {
            Some(game) => Arc::new(SearchContext::from_game(game, limits.depth)),
            None => {
                self.inner.searching.store(false, Ordering::SeqCst);
                return Err(EngineError::NoGame);
            }
        };
        *self.inner.session.lock() = Some(Arc::clone(&context));
        self.inner.iterations.store(0, Ordering::SeqCst);
        self.execute(context, limits.duration, limits.interval);
        Ok(())
    }

    /// Soft reset: keep sampler, tree and iteration count, run further.
    pub fn resume(&self, duration_ms: u64, interval_ms: u64) -> Result<(), EngineError> {
        if self.inner.searching.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Busy);
        }
        let context = match self.inner.session.lock().as_ref() {
            Some(context) => Arc::clone(context),
            None => {
                self.inner.searching.store(false, Ordering::SeqCst);
                return Err(EngineError::NoSearch);
            }
        };
        let limits = SearchLimits::new(duration_ms, interval_ms, context.depth);
        self.execute(context, limits.duration, limits.interval);
        Ok(())
    }

    fn execute(&self, context: Arc<SearchContext>, duration: Duration, interval: Duration) {
        let token = Arc::new(AtomicBool::new(false));
        *self.inner.cancel.lock() = Arc::clone(&token);

        let inner = Arc::clone(&self.inner);
        let config = self.config;
        thread::spawn(move || run_search(inner, config, context, token, duration, interval));
    }

    /// Value every root move under the chosen opponent/partner models.
    /// Runs under the aggregation lock so concurrent callers serialize.
    pub fn evaluate(
        &self,
        opponent: &dyn BackupModel,
        partner: &dyn BackupModel,
    ) -> Result<HashMap<Card, f64>, EngineError> {
        let _guard = self.inner.aggregate.lock();
        let session = self
            .inner
            .session
            .lock()
            .as_ref()
            .map(Arc::clone)
            .ok_or(EngineError::NoSearch)?;
        if self.inner.iterations.load(Ordering::SeqCst) == 0 {
            return Err(EngineError::NoData);
        }
        Ok(Evaluator::new(opponent, partner).evaluate(&session.tree))
    }
}

fn run_search(
    inner: Arc<EngineShared>,
    config: SearchConfig,
    context: Arc<SearchContext>,
    token: Arc<AtomicBool>,
    duration: Duration,
    interval: Duration,
) {
    let started = Instant::now();
    debug!(
        threads = config.threads,
        duration_ms = duration.as_millis() as u64,
        depth = context.depth,
        "search started"
    );

    // Deadline watcher: fires the token when the duration elapses, and
    // goes away quietly if something else cancelled first.
    let watcher = {
        let token = Arc::clone(&token);
        thread::spawn(move || {
            let deadline = started + duration;
            while !token.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= deadline {
                    token.store(true, Ordering::SeqCst);
                    break;
                }
                thread::sleep((deadline - now).min(Duration::from_millis(50)));
            }
        })
    };

    let mut workers = Vec::with_capacity(config.threads.max(1));
    for _ in 0..config.threads.max(1) {
        // Per-worker streams drawn from the master generator under a
        // short lock: reproducible for one thread, deterministic per
        // thread otherwise.
        let seed = inner.master_rng.lock().next_u64();
        let inner = Arc::clone(&inner);
        let context = Arc::clone(&context);
        let token = Arc::clone(&token);
        workers.push(thread::spawn(move || {
            worker_loop(&inner, &context, &token, seed, config.max_iterations);
        }));
    }

    let progress = {
        let inner = Arc::clone(&inner);
        let token = Arc::clone(&token);
        thread::spawn(move || {
            loop {
                let mut slept = Duration::ZERO;
                while slept < interval && !token.load(Ordering::SeqCst) {
                    let step = (interval - slept).min(Duration::from_millis(50));
                    thread::sleep(step);
                    slept += step;
                }
                if token.load(Ordering::SeqCst) {
                    break;
                }
                inner.emit(EngineEvent::Progress {
                    iterations: inner.iterations.load(Ordering::SeqCst),
                    elapsed: started.elapsed(),
                });
            }
        })
    };

    for worker in workers {
        if worker.join().is_err() {
            warn!("search worker ended abnormally");
        }
    }
    let _ = progress.join();
    let _ = watcher.join();

    let elapsed = started.elapsed();
    inner
        .elapsed_ms
        .store(elapsed.as_millis() as u64, Ordering::SeqCst);
    inner.searching.store(false, Ordering::SeqCst);
    let iterations = inner.iterations.load(Ordering::SeqCst);
    debug!(iterations, elapsed_ms = elapsed.as_millis() as u64, "search completed");
    inner.emit(EngineEvent::Completed {
        iterations,
        elapsed,
    });
}

fn worker_loop(
    inner: &EngineShared,
    context: &SearchContext,
    token: &AtomicBool,
    seed: u64,
    max_iterations: Option<u64>,
) {
    let mut rng = SmallRng::seed_from_u64(seed);
    while !token.load(Ordering::SeqCst) {
        let iteration = inner.iterations.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(cap) = max_iterations {
            if iteration >= cap {
                token.store(true, Ordering::SeqCst);
            }
        }

        let mut world = context.sampler.generate(&mut rng);
        if !context.sampler.filter(&world) {
            continue; // rejection sample
        }
        context.sampler.synchronize(&mut world);
        query(
            inner,
            context,
            context.tree.root(),
            &mut world,
            context.depth,
            &mut rng,
        );
    }
}

/// One playout step: descend `depth` random plays through the shared
/// tree, then score the reached node.
fn query(
    inner: &EngineShared,
    context: &SearchContext,
    node: &Arc<Node>,
    world: &mut World,
    depth: u8,
    rng: &mut SmallRng,
) {
    if depth == 0 || world.is_over() {
        let (win, tricks) = evaluate_leaf(inner, context, world);
        node.record(win, tricks);
        return;
    }

    let moves = world.legal_moves();
    if moves.is_empty() {
        let (win, tricks) = evaluate_leaf(inner, context, world);
        node.record(win, tricks);
        return;
    }

    let card = moves[rng.gen_range(0..moves.len())];
    let key = world.play(card);
    let child = context.tree.get_or_create(key, context.role_of(world.leader()));
    let edge = node.edge(card);
    edge.update(&child);
    query(inner, context, &child, world, depth - 1, rng);
}

/// Win/trick outcome for the searched partnership. Declarer's side wins
/// by reaching the contract; the defenders win by denying it.
fn evaluate_leaf(
    inner: &EngineShared,
    context: &SearchContext,
    world: &World,
) -> (bool, u8) {
    let side = world.leader().side();
    let total = match world.tricks(inner.provider.as_ref()) {
        Ok(total) => total,
        Err(error) => {
            warn!(%error, "oracle evaluation failed; counting no further tricks");
            world.taken(side)
        }
    };
    let tricks_for = |wanted: Side| {
        if wanted == side {
            total
        } else {
            13u8.saturating_sub(total)
        }
    };

    let can_make = tricks_for(context.declarer_side) >= context.required_tricks;
    let win = can_make == (context.root_side == context.declarer_side);
    (win, tricks_for(context.root_side))
}

#[cfg(test)]
mod tests {
    use super::{EngineError, SearchConfig, SearchEngine, SearchLimits};
    use crate::backup::{Adversarial, Optimistic};
    use crate::oracle::MinimaxProvider;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn limits_are_clamped_to_supported_ranges() {
        let limits = SearchLimits::new(10, 5, 9);
        assert_eq!(limits.duration, Duration::from_millis(250));
        assert_eq!(limits.interval, Duration::from_millis(50));
        assert_eq!(limits.depth, 3);

        let limits = SearchLimits::new(400, 5000, 0);
        assert_eq!(limits.interval, Duration::from_millis(400));
        assert_eq!(limits.depth, 1);
    }

    #[test]
    fn search_without_a_game_is_rejected() {
        let engine = SearchEngine::new(SearchConfig::default(), Arc::new(MinimaxProvider));
        let result = engine.search(SearchLimits::new(250, 100, 1));
        assert!(matches!(result, Err(EngineError::NoGame)));
        assert!(!engine.is_searching());
    }

    #[test]
    fn resume_and_evaluate_need_a_prior_search() {
        let engine = SearchEngine::new(SearchConfig::default(), Arc::new(MinimaxProvider));
        assert!(matches!(
            engine.resume(250, 100),
            Err(EngineError::NoSearch)
        ));
        assert!(matches!(
            engine.evaluate(&Adversarial, &Optimistic),
            Err(EngineError::NoSearch)
        ));
    }
}
