//! Example usage of the [`mpc_ecdsa`] crate.
//!
//! Each party is represented by a worker thread with its own message store.
//! The main thread routes [`Message`]s between workers over
//! [`std::sync::mpsc`] channels and acts as the round barrier: a round's
//! messages are only delivered once every party has finished the round.
//! A round that does not finish within the timeout aborts the run.

use anyhow::bail;
use clap::{Parser, ValueEnum};
use mpc_ecdsa::{
    errors::Error, CurveTrait, InMemoryMessageStore, KeyShareConfig, KeySharingPlayer, Message,
    MessageStore, PaillierDecryptionKey, PartyIndex, Secp256k1, SignatureShare, SigningPlayer,
    P256, PRIME_BITS,
};
use rand::thread_rng;
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument, span, trace, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CurveArg {
    Secp256k1,
    P256,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CommandLineArgs {
    /// Number of parties holding a share of the key, one worker thread each.
    #[arg(short = 'n', long, default_value_t = 3)]
    parties: usize,
    /// Any `threshold + 1` parties can sign.
    #[arg(short, long, default_value_t = 1)]
    threshold: usize,
    /// Number of parties taking part in signing. Defaults to
    /// `threshold + 1`.
    #[arg(short, long)]
    signers: Option<usize>,
    #[arg(short, long, value_enum, default_value_t = CurveArg::P256)]
    curve: CurveArg,
    /// Message to sign.
    #[arg(short, long, default_value = "hello world")]
    message: String,
    /// How long a round may take before the run is aborted, in milliseconds.
    #[arg(long, default_value_t = 60_000)]
    round_timeout_ms: u64,
    /// Bit size of the primes of each signer's Paillier key.
    #[arg(long, default_value_t = PRIME_BITS)]
    prime_bits: usize,
}

/// One round of one of the protocols.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
enum Step {
    GenerateKey,
    FinalizeKey,
    PresignOne,
    PresignTwo,
    PresignThree,
    PresignFinal,
    Sign,
}

/// Messages from main thread to worker threads.
#[derive(Debug)]
enum ToWorker {
    /// A message from another party.
    Deliver(Message),
    /// Run the given round with the messages delivered so far.
    Run(Step),
    Shutdown,
}

/// What a round produced besides messages.
#[derive(Debug)]
enum Output<C: CurveTrait> {
    Nothing,
    PublicShare(C),
    R(C::Scalar),
    Share(SignatureShare<C>),
}

/// Messages from worker threads to main thread.
#[derive(Debug)]
enum FromWorker<C: CurveTrait> {
    FinishedRound {
        from: PartyIndex,
        messages: Vec<Message>,
        output: Output<C>,
    },
    Aborted {
        from: PartyIndex,
        reason: String,
    },
}

/// 1) Set up logging.
/// 2) Spawn a worker thread per party.
/// 3) Main thread runs key generation and then signs one message.
fn main() -> anyhow::Result<()> {
    let cli = CommandLineArgs::parse();
    let filter = EnvFilter::from_default_env().add_directive("threaded=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .compact()
        .init();
    let span = span!(Level::INFO, "main");
    let _enter = span.entered();

    match cli.curve {
        CurveArg::Secp256k1 => run::<Secp256k1>(&cli),
        CurveArg::P256 => run::<P256>(&cli),
    }
}

fn run<C: CurveTrait>(cli: &CommandLineArgs) -> anyhow::Result<()> {
    let mut config = KeyShareConfig::new("threaded-demo", C::NAME, cli.parties, cli.threshold)?;
    let all = (1..=cli.parties as u32)
        .map(PartyIndex::new)
        .collect::<Result<Vec<_>, _>>()?;
    let signers = all[..cli.signers.unwrap_or(cli.threshold + 1).min(all.len())].to_vec();
    let digest = Sha256::digest(cli.message.as_bytes()).to_vec();
    let timeout = Duration::from_millis(cli.round_timeout_ms);

    info!("Spawning {} worker threads", all.len());
    let (outgoing_tx, from_workers) = channel::<FromWorker<C>>();
    let mut to_workers = HashMap::new();
    let mut handles = vec![];
    for index in &all {
        let mut key_player = KeySharingPlayer::<C>::new(&config)?;
        key_player.set_index(*index, &all)?;
        let worker = Worker {
            index: *index,
            signers: signers.clone(),
            digest: digest.clone(),
            prime_bits: cli.prime_bits,
            store: InMemoryMessageStore::new(),
            key_player,
            signer: None,
        };
        let (tx, rx) = channel::<ToWorker>();
        let _ = to_workers.insert(*index, tx);
        let outgoing = outgoing_tx.clone();
        handles.push(thread::spawn(move || {
            participant_worker(worker, rx, outgoing, timeout)
        }));
    }

    let runner = Runner {
        to_workers,
        from_workers,
        timeout,
    };
    let result = sign_with_new_key(&runner, &mut config, &all, &signers, &digest);
    runner.shutdown();
    join_all(handles)?;
    result
}

fn sign_with_new_key<C: CurveTrait>(
    runner: &Runner<C>,
    config: &mut KeyShareConfig,
    all: &[PartyIndex],
    signers: &[PartyIndex],
    digest: &[u8],
) -> anyhow::Result<()> {
    let start = Instant::now();
    let _ = runner.run_round(Step::GenerateKey, all)?;
    let mut pk = C::identity();
    for (_, output) in runner.run_round(Step::FinalizeKey, all)? {
        match output {
            Output::PublicShare(ui_g) => pk = pk.add(&ui_g),
            other => bail!("unexpected output of key generation: {other:?}"),
        }
    }
    config.set_public_key(&pk)?;
    info!(
        "Generated public key {} in {}ms",
        config.encoded_public_key().unwrap_or_default(),
        start.elapsed().as_millis()
    );

    // Parties that do not sign are done.
    for party in all.iter().filter(|p| !signers.contains(p)) {
        runner.send(*party, ToWorker::Shutdown)?;
    }

    let start = Instant::now();
    for step in [Step::PresignOne, Step::PresignTwo, Step::PresignThree] {
        let _ = runner.run_round(step, signers)?;
    }
    let mut rs = vec![];
    for (from, output) in runner.run_round(Step::PresignFinal, signers)? {
        match output {
            Output::R(r) => rs.push((from, r)),
            other => bail!("unexpected output of presigning: {other:?}"),
        }
    }
    if rs.iter().any(|(_, r)| *r != rs[0].1) {
        error!("Signers disagree on r: {:?}", rs);
        bail!("signers disagree on r");
    }
    info!("Presigning took {}ms", start.elapsed().as_millis());

    let mut signature: Option<SignatureShare<C>> = None;
    for (_, output) in runner.run_round(Step::Sign, signers)? {
        let share = match output {
            Output::Share(share) => share,
            other => bail!("unexpected output of signing: {other:?}"),
        };
        signature = Some(match signature {
            Some(acc) => acc.chain(&share)?,
            None => share,
        });
    }
    let der = match signature {
        Some(signature) => signature.finish()?,
        None => bail!("nobody signed"),
    };
    pk.verify_prehash(digest, &der)?;
    info!("Signature by {:?}: {}", signers, hex::encode(der));
    Ok(())
}

fn join_all(handles: Vec<JoinHandle<anyhow::Result<()>>>) -> anyhow::Result<()> {
    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => bail!("a worker thread panicked"),
        }
    }
    Ok(())
}

/// Helper type for running rounds on the workers.
struct Runner<C: CurveTrait> {
    /// Channels for routing specific `Message`s to a given worker.
    to_workers: HashMap<PartyIndex, Sender<ToWorker>>,
    /// Receive messages from worker threads to route to other workers.
    from_workers: Receiver<FromWorker<C>>,
    timeout: Duration,
}

impl<C: CurveTrait> Runner<C> {
    fn send(&self, to: PartyIndex, message: ToWorker) -> anyhow::Result<()> {
        match self.to_workers.get(&to) {
            Some(worker) => {
                if worker.send(message).is_err() {
                    bail!("worker {to} has stopped");
                }
                Ok(())
            }
            None => bail!("no worker for party {to}"),
        }
    }

    /// Runs `step` on every one of `parties`, then delivers the round's
    /// messages. Returns each party's output, in party order.
    #[instrument(skip(self, parties))]
    fn run_round(
        &self,
        step: Step,
        parties: &[PartyIndex],
    ) -> anyhow::Result<Vec<(PartyIndex, Output<C>)>> {
        debug!("Starting round");
        for party in parties {
            self.send(*party, ToWorker::Run(step))?;
        }

        let deadline = Instant::now() + self.timeout;
        let mut outputs = vec![];
        let mut messages = vec![];
        while outputs.len() < parties.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.from_workers.recv_timeout(remaining) {
                Ok(FromWorker::FinishedRound {
                    from,
                    messages: sent,
                    output,
                }) => {
                    trace!("Party {} finished with {} messages", from, sent.len());
                    messages.extend(sent);
                    outputs.push((from, output));
                }
                Ok(FromWorker::Aborted { from, reason }) => {
                    error!("Party {} aborted: {}", from, reason);
                    bail!("party {from} aborted {step:?}: {reason}");
                }
                Err(_) => {
                    error!("Round timed out after {:?}", self.timeout);
                    bail!("{step:?} did not finish within {:?}", self.timeout);
                }
            }
        }

        // Everyone is done with this round, so the next one can see all of
        // its inputs.
        for message in messages {
            if message.to().is_broadcast() {
                for party in parties.iter().filter(|p| **p != message.from()) {
                    self.send(*party, ToWorker::Deliver(message.clone()))?;
                }
            } else {
                self.send(message.to(), ToWorker::Deliver(message))?;
            }
        }
        outputs.sort_by_key(|(from, _)| *from);
        Ok(outputs)
    }

    fn shutdown(&self) {
        for worker in self.to_workers.values() {
            let _ = worker.send(ToWorker::Shutdown);
        }
    }
}

/// Per-thread state of a party.
struct Worker<C: CurveTrait> {
    index: PartyIndex,
    signers: Vec<PartyIndex>,
    digest: Vec<u8>,
    prime_bits: usize,
    store: InMemoryMessageStore,
    key_player: KeySharingPlayer<C>,
    signer: Option<SigningPlayer<C>>,
}

impl<C: CurveTrait> Worker<C> {
    fn run_step(&mut self, step: Step) -> mpc_ecdsa::errors::Result<(Vec<Message>, Output<C>)> {
        let rng = &mut thread_rng();
        if step == Step::PresignOne {
            // A fresh Paillier key for every signing session.
            let paillier = PaillierDecryptionKey::generate(self.prime_bits)?;
            self.signer = Some(SigningPlayer::new(self.key_player.key_share()?, paillier)?);
        }
        match step {
            Step::GenerateKey => Ok((self.key_player.generate_key(rng)?, Output::Nothing)),
            Step::FinalizeKey => {
                let ui_g = self.key_player.finalize(&self.store)?;
                Ok((vec![], Output::PublicShare(ui_g)))
            }
            _ => {
                let signer = match self.signer.as_mut() {
                    Some(signer) => signer,
                    None => {
                        return Err(Error::ProtocolState(format!(
                            "party {} is not signing",
                            self.index
                        )))
                    }
                };
                match step {
                    Step::PresignOne => Ok((signer.pre_signing_step1(rng)?, Output::Nothing)),
                    Step::PresignTwo => Ok((
                        signer.pre_signing_step2(rng, &self.signers, &self.store)?,
                        Output::Nothing,
                    )),
                    Step::PresignThree => Ok((
                        vec![signer.pre_signing_step3(&self.signers, &self.store)?],
                        Output::Nothing,
                    )),
                    Step::PresignFinal => {
                        let r = signer.pre_signing_final(&self.signers, &self.store)?;
                        Ok((vec![], Output::R(r)))
                    }
                    _ => Ok((vec![], Output::Share(signer.sign(&self.digest)?))),
                }
            }
        }
    }
}

/// Main function executed by each worker thread. Stores delivered messages
/// and runs rounds when told to, until shut down. Gives up if nothing
/// arrives within `timeout`.
#[instrument(skip_all, fields(party = %worker.index))]
fn participant_worker<C: CurveTrait>(
    mut worker: Worker<C>,
    inbox: Receiver<ToWorker>,
    outgoing: Sender<FromWorker<C>>,
    timeout: Duration,
) -> anyhow::Result<()> {
    info!("Worker thread started.");
    let from = worker.index;
    let abort = |reason: String| {
        error!("Aborting: {}", reason);
        let _ = outgoing.send(FromWorker::Aborted { from, reason });
    };
    loop {
        match inbox.recv_timeout(timeout) {
            Ok(ToWorker::Deliver(message)) => {
                if let Err(e) = worker.store.save(message) {
                    abort(e.to_string());
                    return Ok(());
                }
            }
            Ok(ToWorker::Run(step)) => match worker.run_step(step) {
                Ok((messages, output)) => {
                    if outgoing
                        .send(FromWorker::FinishedRound {
                            from,
                            messages,
                            output,
                        })
                        .is_err()
                    {
                        return Ok(());
                    }
                }
                Err(e) => {
                    abort(e.to_string());
                    return Ok(());
                }
            },
            Ok(ToWorker::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker thread stopping.");
                return Ok(());
            }
            Err(RecvTimeoutError::Timeout) => {
                abort(format!("nothing arrived within {timeout:?}"));
                return Ok(());
            }
        }
    }
}
