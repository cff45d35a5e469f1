//! Embedded game host: the game runs in-process and botgate itself owns the
//! bot subprocesses.
//!
//! The host is behind [`EmbeddedHost`] so the runner works the same against a
//! real in-process server or a test double. Bots connect to the game over the
//! URL published in `POKERFORBOTS_SERVER`; crashes are reported to the health
//! monitor and restarted while the monitor still allows it.

use crate::{CancelToken, GameRunner, ServerError, parse_stats_artifact};
use botgate_health::HealthMonitor;
use botgate_types::{BatchConfiguration, GameStats, Role};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Environment variables a spawned bot reads to find its game.
pub const ENV_SERVER: &str = "POKERFORBOTS_SERVER";
pub const ENV_BOT_ID: &str = "POKERFORBOTS_BOT_ID";
pub const ENV_GAME: &str = "POKERFORBOTS_GAME";
pub const ENV_SEED: &str = "POKERFORBOTS_SEED";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STATS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// An in-process game server capable of hosting one game at a time.
pub trait EmbeddedHost {
    fn start_game(
        &self,
        seed: u64,
        hands: u64,
        seats: usize,
        npc_roster: Option<&str>,
    ) -> Result<Box<dyn EmbeddedGame>, ServerError>;
}

/// A single running game inside an embedded host.
pub trait EmbeddedGame {
    fn game_id(&self) -> &str;

    /// URL bots connect to.
    fn join_url(&self) -> String;

    /// Admin endpoint serving the stats artifact for this game.
    fn stats_url(&self) -> String;

    fn is_finished(&self) -> bool;

    fn stop(&self);
}

/// Placeholder host for deployments without an in-process game server.
///
/// Always reports [`ServerError::EmbeddedUnavailable`], which makes a
/// fallback chain skip straight to the subprocess runner.
#[derive(Debug, Default)]
pub struct UnavailableHost;

impl EmbeddedHost for UnavailableHost {
    fn start_game(
        &self,
        _seed: u64,
        _hands: u64,
        _seats: usize,
        _npc_roster: Option<&str>,
    ) -> Result<Box<dyn EmbeddedGame>, ServerError> {
        Err(ServerError::EmbeddedUnavailable)
    }
}

/// Launches bot processes wired to one game via the `POKERFORBOTS_*` env.
pub struct BotSpawner {
    join_url: String,
    game_id: String,
    seed: u64,
}

impl BotSpawner {
    pub fn new(game: &dyn EmbeddedGame, seed: u64) -> Self {
        Self {
            join_url: game.join_url(),
            game_id: game.game_id().to_string(),
            seed,
        }
    }

    pub fn spawn(&self, command_line: &str, bot_id: &str) -> Result<Child, ServerError> {
        let argv = shell_words::split(command_line)
            .map_err(|e| ServerError::Embedded(format!("bad bot command {command_line:?}: {e}")))?;
        if argv.is_empty() {
            return Err(ServerError::Embedded(format!(
                "bot command for {bot_id} is empty"
            )));
        }
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .env(ENV_SERVER, &self.join_url)
            .env(ENV_GAME, &self.game_id)
            .env(ENV_BOT_ID, bot_id)
            .env(ENV_SEED, self.seed.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd.spawn()
            .map_err(|source| ServerError::Spawn { argv, source })
    }
}

struct BotSeat {
    bot_id: String,
    command: String,
    child: Option<Child>,
    restart_at: Option<Instant>,
}

impl BotSeat {
    fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn shutdown_all(bots: &mut [BotSeat]) {
    for bot in bots {
        bot.shutdown();
    }
}

/// Runs batches on an [`EmbeddedHost`], owning the bot process lifecycle.
pub struct EmbeddedRunner<H> {
    host: H,
    batch_timeout: Option<Duration>,
}

impl<H: EmbeddedHost> EmbeddedRunner<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            batch_timeout: None,
        }
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    fn seat_bots(batch: &BatchConfiguration) -> Vec<BotSeat> {
        let scored: Vec<(usize, Role)> = batch.seat_plan.scored_seats().collect();
        batch
            .bot_commands
            .iter()
            .zip(&scored)
            .map(|(command, (seat, role))| BotSeat {
                bot_id: format!("{}-{}", role.key_prefix(), seat),
                command: command.clone(),
                child: None,
                restart_at: None,
            })
            .collect()
    }
}

impl<H: EmbeddedHost> GameRunner for EmbeddedRunner<H> {
    fn name(&self) -> &str {
        "embedded"
    }

    fn run_batch(
        &self,
        batch: &BatchConfiguration,
        health: &HealthMonitor,
        cancel: &CancelToken,
    ) -> Result<GameStats, ServerError> {
        let game = self.host.start_game(
            batch.seed,
            batch.hands,
            batch.seat_plan.total_seats(),
            batch.npc_roster.as_deref(),
        )?;
        debug!(game = game.game_id(), seed = batch.seed, hands = batch.hands, "embedded game started");

        let spawner = BotSpawner::new(game.as_ref(), batch.seed);
        let mut bots = Self::seat_bots(batch);
        let mut spawn_error = None;
        for bot in &mut bots {
            let binary = bot.command.split_whitespace().next().unwrap_or_default();
            health.register_bot(&bot.bot_id, binary, &bot.bot_id);
            match spawner.spawn(&bot.command, &bot.bot_id) {
                Ok(child) => bot.child = Some(child),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = spawn_error {
            game.stop();
            shutdown_all(&mut bots);
            return Err(e);
        }

        let started = Instant::now();
        let restart_delay = health.restart_delay();
        loop {
            if cancel.is_cancelled() {
                game.stop();
                shutdown_all(&mut bots);
                return Err(ServerError::Cancelled);
            }
            if game.is_finished() {
                break;
            }
            if let Some(timeout) = self.batch_timeout
                && started.elapsed() >= timeout
            {
                game.stop();
                shutdown_all(&mut bots);
                return Err(ServerError::CompletionTimeout);
            }

            for bot in &mut bots {
                if let Some(child) = bot.child.as_mut() {
                    // A bot exiting while the game runs is a crash.
                    if let Ok(Some(status)) = child.try_wait() {
                        warn!(bot = %bot.bot_id, %status, "bot exited mid-game");
                        bot.child = None;
                        if health.record_crash(&bot.bot_id) {
                            bot.restart_at = Some(Instant::now() + restart_delay);
                        }
                    }
                } else if let Some(at) = bot.restart_at
                    && Instant::now() >= at
                {
                    bot.restart_at = None;
                    match spawner.spawn(&bot.command, &bot.bot_id) {
                        Ok(child) => {
                            debug!(bot = %bot.bot_id, "bot restarted");
                            bot.child = Some(child);
                        }
                        Err(e) => {
                            warn!(bot = %bot.bot_id, error = %e, "bot restart failed");
                        }
                    }
                }
            }

            std::thread::sleep(POLL_INTERVAL);
        }

        let stats = fetch_stats(&game.stats_url());
        game.stop();
        shutdown_all(&mut bots);
        stats
    }
}

fn fetch_stats(url: &str) -> Result<GameStats, ServerError> {
    let err = |message: String| ServerError::StatsFetch {
        url: url.to_string(),
        message,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(STATS_FETCH_TIMEOUT)
        .build()
        .map_err(|e| err(e.to_string()))?;
    let resp = client.get(url).send().map_err(|e| err(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(err(format!("HTTP {}", resp.status())));
    }
    let bytes = resp.bytes().map_err(|e| err(e.to_string()))?;
    parse_stats_artifact(&bytes)
}
