//! The driver: executes programs of kernel calls on one party's session.
//!
//! A [`Session`] bundles the communication context, the protocol state and the kernel registry
//! of one party. Every party of a computation runs its own session and must issue the same
//! sequence of calls; each call gets a tag derived from its kernel name and its position in that
//! sequence, which is how the parties' messages and correlated randomness are matched up.

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    future::Future,
    sync::Arc,
};

use futures::future::try_join_all;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    kernel::{KernelEvalContext, Registry},
    plain, semi2k,
    state::Semi2kState,
};
use crate::{
    channel::{Channel, ErrorKind, SimpleChannel},
    config::SessionConfig,
    error::{ConfigError, Error},
    link::Link,
    ring::{ArrayRef, Field, share_arith},
    utils::party_seed,
};

/// Identifies a value in a session's [`ValueArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub usize);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Whether an operation works on secret shares or on values every party knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Evaluated locally on plaintext operands.
    Public,
    /// Evaluated by the protocol kernel on shares.
    Secret,
}

/// One typed operation of a compiled program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// The name of the kernel to run.
    pub kernel: String,
    /// The values the kernel reads.
    pub operands: Vec<ValueId>,
    /// The values the kernel defines; every semi2k kernel defines exactly one.
    pub outputs: Vec<ValueId>,
    /// Whether the operation runs the protocol or a local computation.
    pub visibility: Visibility,
}

impl Operation {
    /// A protocol operation on shares.
    pub fn secret(kernel: &str, operands: &[ValueId], output: ValueId) -> Self {
        Self {
            kernel: kernel.to_string(),
            operands: operands.to_vec(),
            outputs: vec![output],
            visibility: Visibility::Secret,
        }
    }

    /// A local operation on public values.
    pub fn public(kernel: &str, operands: &[ValueId], output: ValueId) -> Self {
        Self {
            visibility: Visibility::Public,
            ..Self::secret(kernel, operands, output)
        }
    }
}

/// An ordered sequence of operations, as produced by the compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// The operations, in program order.
    pub ops: Vec<Operation>,
}

impl Program {
    /// An empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    pub fn push(&mut self, op: Operation) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Groups the operations into waves: every operation only reads values defined before the
    /// program or by an earlier wave. Within a wave, operations keep their program order.
    pub fn waves(&self) -> Vec<Vec<usize>> {
        let mut defined_in: HashMap<ValueId, usize> = HashMap::new();
        let mut waves: Vec<Vec<usize>> = vec![];
        for (i, op) in self.ops.iter().enumerate() {
            let wave = op
                .operands
                .iter()
                .filter_map(|v| defined_in.get(v).map(|w| w + 1))
                .max()
                .unwrap_or(0);
            for out in &op.outputs {
                defined_in.insert(*out, wave);
            }
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(i);
        }
        waves
    }
}

/// The values of a session, by id. A defined value is never overwritten; it can only be
/// released.
#[derive(Debug, Default)]
pub struct ValueArena {
    values: HashMap<ValueId, ArrayRef>,
}

impl ValueArena {
    /// Defines `id`, failing if it is already defined.
    pub fn insert(&mut self, id: ValueId, value: ArrayRef) -> Result<(), Error> {
        match self.values.entry(id) {
            Entry::Occupied(_) => Err(Error::ValueAlreadyDefined(id.0)),
            Entry::Vacant(e) => {
                e.insert(value);
                Ok(())
            }
        }
    }

    /// The value of `id`.
    pub fn get(&self, id: ValueId) -> Result<&ArrayRef, Error> {
        self.values.get(&id).ok_or(Error::UnknownValue(id.0))
    }

    /// Removes `id`, returning its value; the id can be defined again afterwards.
    pub fn release(&mut self, id: ValueId) -> Result<ArrayRef, Error> {
        self.values.remove(&id).ok_or(Error::UnknownValue(id.0))
    }

    /// Whether `id` is defined.
    pub fn contains(&self, id: ValueId) -> bool {
        self.values.contains_key(&id)
    }

    /// The number of defined values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no value is defined.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// The lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Bootstrapped, no kernel has run yet.
    Idle,
    /// At least one kernel has run successfully.
    Running,
    /// Closed by [`Session::close`].
    Closed,
    /// A call failed; the session cannot be used any more.
    Failed,
}

/// One party's semi2k session.
pub struct Session<C: Channel> {
    link: Link<C>,
    state: Semi2kState,
    registry: Registry,
    config: SessionConfig,
    values: ValueArena,
    status: SessionStatus,
    seq: u64,
    rng: ChaCha20Rng,
}

impl<C: Channel + Sync> Session<C> {
    /// Sets up the session of party `rank` over `channel`.
    ///
    /// Validates the configuration and runs the setup of the Beaver source, which is the only
    /// communication before the first kernel call.
    pub async fn bootstrap(
        channel: C,
        rank: usize,
        world_size: usize,
        config: SessionConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let link = Link::new(channel, rank, world_size)?;
        let state = Semi2kState::new(&link, &config).await?;
        let registry = semi2k::registry(config.b2a);
        let seed = party_seed(config.seed, "ringmpc 2024 session input seed", rank);
        info!(
            rank,
            world_size,
            beaver = ?config.beaver,
            b2a = ?config.b2a,
            "session bootstrapped"
        );
        Ok(Self {
            link,
            state,
            registry,
            config,
            values: ValueArena::default(),
            status: SessionStatus::Idle,
            seq: 0,
            rng: ChaCha20Rng::from_seed(seed),
        })
    }

    /// The own rank.
    pub fn rank(&self) -> usize {
        self.link.rank()
    }

    /// The number of parties.
    pub fn world_size(&self) -> usize {
        self.link.world_size()
    }

    /// The current lifecycle state.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// The communication context.
    pub fn link(&self) -> &Link<C> {
        &self.link
    }

    /// The protocol state.
    pub fn state(&self) -> &Semi2kState {
        &self.state
    }

    /// The kernels available in this session.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The configuration the session was bootstrapped with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The values defined by programs and [`Session::define`].
    pub fn values(&self) -> &ValueArena {
        &self.values
    }

    /// Defines a value in the arena, e.g. an input share.
    pub fn define(&mut self, id: ValueId, value: ArrayRef) -> Result<(), Error> {
        self.check_usable()?;
        self.values.insert(id, value)
    }

    /// Removes a value from the arena.
    pub fn release(&mut self, id: ValueId) -> Result<ArrayRef, Error> {
        self.check_usable()?;
        self.values.release(id)
    }

    fn check_usable(&self) -> Result<(), Error> {
        match self.status {
            SessionStatus::Closed => Err(Error::SessionClosed),
            SessionStatus::Failed => Err(Error::SessionAborted),
            SessionStatus::Idle | SessionStatus::Running => Ok(()),
        }
    }

    fn next_tag(&mut self, name: &str) -> String {
        let tag = format!("{name}#{}", self.seq);
        self.seq += 1;
        tag
    }

    fn finish<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        match result {
            Ok(v) => {
                self.status = SessionStatus::Running;
                Ok(v)
            }
            Err(e) => {
                warn!(rank = self.rank(), error = %e, "session failed");
                self.status = SessionStatus::Failed;
                self.link.abort();
                // outputs of earlier calls are partial results of a failed computation
                self.values.clear();
                Err(e)
            }
        }
    }

    /// Runs the kernel registered as `kernel` on the own shares of `operands`.
    pub async fn call(&mut self, kernel: &str, operands: &[ArrayRef]) -> Result<ArrayRef, Error> {
        self.check_usable()?;
        let tag = self.next_tag(kernel);
        let result = execute(&self.link, &self.state, &self.registry, kernel, &tag, operands).await;
        self.finish(result)
    }

    /// Secret-shares the input of party `owner` additively; every party gets its share.
    ///
    /// Only the owner passes `Some(secret)`, which must have `len` elements of `field`.
    pub async fn input(
        &mut self,
        owner: usize,
        field: Field,
        len: usize,
        secret: Option<&ArrayRef>,
    ) -> Result<ArrayRef, Error> {
        self.check_usable()?;
        let tag = self.next_tag("input");
        let result = self.scatter_input(&tag, owner, field, len, secret).await;
        self.finish(result)
    }

    async fn scatter_input(
        &mut self,
        tag: &str,
        owner: usize,
        field: Field,
        len: usize,
        secret: Option<&ArrayRef>,
    ) -> Result<ArrayRef, Error> {
        let inputs = if self.rank() == owner {
            let secret = secret.ok_or_else(|| Error::InvalidOperand {
                op: tag.to_string(),
                reason: "the owner must provide the input".to_string(),
            })?;
            secret.check_compatible(&ArrayRef::zeros(field, len), tag)?;
            share_arith(secret, self.world_size(), &mut self.rng)
                .iter()
                .map(ArrayRef::to_bytes)
                .collect()
        } else {
            vec![]
        };
        debug!(tag, owner, %field, len, "input");
        let bytes = self.link.scatter(owner, inputs, tag).await?;
        ArrayRef::from_bytes(field, len, &bytes)
            .ok_or_else(|| self.link.fail(tag, ErrorKind::InvalidLength))
    }

    /// Opens an additively shared value to all parties.
    pub async fn reveal(&mut self, x: &ArrayRef) -> Result<ArrayRef, Error> {
        self.call("A2P", std::slice::from_ref(x)).await
    }

    /// Opens a boolean shared value to all parties.
    pub async fn reveal_bool(&mut self, x: &ArrayRef) -> Result<ArrayRef, Error> {
        self.call("B2P", std::slice::from_ref(x)).await
    }

    /// Generates `count` random bits of `field` for the zero-cost `B2A` conversion.
    pub async fn precompute_b2a(&mut self, field: Field, count: usize) -> Result<(), Error> {
        self.check_usable()?;
        let tag = self.next_tag("precompute_b2a");
        let result = self
            .state
            .precompute_b2a(&self.link, &tag, field, count)
            .await;
        self.finish(result)
    }

    /// Runs `program` in program order.
    pub async fn run(&mut self, program: &Program) -> Result<(), Error> {
        for op in &program.ops {
            self.check_usable()?;
            let tag = self.next_tag(&op.kernel);
            let result = self.eval(op, &tag).await;
            let (id, value) = self.finish(result)?;
            let defined = self.values.insert(id, value);
            self.finish(defined)?;
        }
        Ok(())
    }

    /// Runs `program` wave by wave (see [`Program::waves`]), evaluating up to `num_threads`
    /// independent operations at a time.
    ///
    /// Tags are still assigned in program order, so the result is the same as that of
    /// [`Session::run`].
    pub async fn run_concurrent(&mut self, program: &Program) -> Result<(), Error> {
        self.check_usable()?;
        let tags: Vec<String> = program
            .ops
            .iter()
            .map(|op| self.next_tag(&op.kernel))
            .collect();
        let batch = self.config.num_threads.max(1);
        for wave in program.waves() {
            for chunk in wave.chunks(batch) {
                let this = &*self;
                let results = try_join_all(
                    chunk
                        .iter()
                        .map(|&i| this.eval(&program.ops[i], &tags[i])),
                )
                .await;
                for (id, value) in self.finish(results)? {
                    let defined = self.values.insert(id, value);
                    self.finish(defined)?;
                }
            }
        }
        Ok(())
    }

    async fn eval(&self, op: &Operation, tag: &str) -> Result<(ValueId, ArrayRef), Error> {
        let [output] = op.outputs[..] else {
            return Err(Error::InvalidOperand {
                op: op.kernel.clone(),
                reason: format!("expected 1 output, got {}", op.outputs.len()),
            });
        };
        if self.values.contains(output) {
            return Err(Error::ValueAlreadyDefined(output.0));
        }
        let operands = op
            .operands
            .iter()
            .map(|id| self.values.get(*id).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let value = match op.visibility {
            Visibility::Secret => {
                execute(&self.link, &self.state, &self.registry, &op.kernel, tag, &operands)
                    .await?
            }
            Visibility::Public => {
                let entry = self.registry.get(&op.kernel)?;
                plain::eval(entry.op(), entry.name(), &operands)?
            }
        };
        Ok((output, value))
    }

    /// Closes the session, releasing all values. Later calls fail with
    /// [`Error::SessionClosed`].
    pub fn close(&mut self) {
        if self.status != SessionStatus::Closed {
            let stats = self.link.stats();
            info!(
                rank = self.rank(),
                calls = self.seq,
                bytes_sent = stats.bytes_sent,
                messages_sent = stats.messages_sent,
                "session closed"
            );
        }
        self.values.clear();
        self.status = SessionStatus::Closed;
    }
}

async fn execute<C: Channel + Sync>(
    link: &Link<C>,
    state: &Semi2kState,
    registry: &Registry,
    kernel: &str,
    tag: &str,
    operands: &[ArrayRef],
) -> Result<ArrayRef, Error> {
    let entry = registry.get(kernel)?;
    if let Some(x) = operands.first() {
        debug!(kernel, tag, field = %x.field(), len = x.len(), "kernel");
    }
    let ctx = KernelEvalContext::new(link, state, entry.name(), tag.to_string());
    entry.proc(&ctx, operands).await
}

/// Runs `n` parties in one process, connected by [`SimpleChannel`]s, and returns their results
/// by rank.
///
/// Every party bootstraps a session with `config` and hands it to `f`. The parties run as tasks
/// of a multi-threaded tokio runtime with `config.num_threads` workers, so this must not be
/// called from within another runtime.
pub fn simulate<T, F, Fut>(n: usize, config: SessionConfig, f: F) -> Result<Vec<T>, Error>
where
    T: Send + 'static,
    F: Fn(Session<SimpleChannel>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
    config.validate()?;
    if n < 2 {
        return Err(ConfigError::TooFewParties(n).into());
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.num_threads)
        .enable_time()
        .build()
        .map_err(|e| ConfigError::Runtime(e.to_string()))?;
    let f = Arc::new(f);
    runtime.block_on(async move {
        let channels = SimpleChannel::channels_with_timeout(n, config.recv_timeout);
        let handles: Vec<_> = channels
            .into_iter()
            .enumerate()
            .map(|(rank, channel)| {
                let f = Arc::clone(&f);
                let config = config.clone();
                tokio::spawn(async move {
                    let session = Session::bootstrap(channel, rank, n, config).await?;
                    (*f)(session).await
                })
            })
            .collect();
        let mut results = Vec::with_capacity(n);
        for handle in handles {
            let result = handle
                .await
                .map_err(|e| ConfigError::Runtime(e.to_string()))?;
            results.push(result?);
        }
        Ok::<_, Error>(results)
    })
}
