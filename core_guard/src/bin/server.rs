use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use core_guard::runtime::DEFAULT_WORLD;
use core_guard::{build_headless_runtime, ActorKind, HeadlessRuntime, Privileges, WorldId};
use guard_runtime::{parse_command_line, CommandPayload};

const DEFAULT_COMMAND_BIND: &str = "127.0.0.1:41101";
const STEP_INTERVAL: Duration = Duration::from_millis(50);
const DEMO_SEED: u64 = 0x7419_c0de;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let command_bind = std::env::var("GUARD_COMMAND_BIND")
        .ok()
        .and_then(|raw| match raw.parse::<SocketAddr>() {
            Ok(addr) => Some(addr),
            Err(err) => {
                warn!(
                    target: "tick_guard::server",
                    value = %raw,
                    error = %err,
                    "command_bind.invalid=fallback_default"
                );
                None
            }
        })
        .or_else(|| DEFAULT_COMMAND_BIND.parse().ok());
    let Some(command_bind) = command_bind else {
        warn!(target: "tick_guard::server", "command_bind.unavailable");
        return;
    };

    let mut runtime = build_headless_runtime();
    seed_demo_population(&mut runtime);

    let command_rx = match spawn_command_listener(command_bind) {
        Ok(rx) => rx,
        Err(err) => {
            warn!(
                target: "tick_guard::server",
                %command_bind,
                error = %err,
                "command_listener.bind_failed"
            );
            return;
        }
    };

    info!(
        target: "tick_guard::server",
        %command_bind,
        "tick_guard headless server ready"
    );

    let mut next_step = Instant::now();
    loop {
        loop {
            match command_rx.try_recv() {
                Ok(request) => handle_request(&mut runtime, request),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    runtime.shutdown();
                    return;
                }
            }
        }

        runtime.step();
        for message in runtime.host_mut().drain_outbox() {
            info!(
                target: "tick_guard::server",
                tick = message.tick,
                recipients = message.recipients.len(),
                text = %core_guard::strip_color(&message.text),
                "broadcast.delivered"
            );
        }

        next_step += STEP_INTERVAL;
        let now = Instant::now();
        if next_step > now {
            thread::sleep(next_step - now);
        } else {
            next_step = now;
        }
    }
}

/// A parsed console command plus the channel its reply goes back on.
#[derive(Debug)]
struct CommandRequest {
    command: CommandPayload,
    reply: Sender<Vec<String>>,
}

fn handle_request(runtime: &mut HeadlessRuntime, request: CommandRequest) {
    let lines = runtime.execute(&request.command);
    info!(
        target: "tick_guard::server",
        command = request.command.verb(),
        lines = lines.len(),
        "command.completed"
    );
    if request.reply.send(lines).is_err() {
        warn!(
            target: "tick_guard::server",
            command = request.command.verb(),
            "command.reply_dropped=client_gone"
        );
    }
}

fn seed_demo_population(runtime: &mut HeadlessRuntime) {
    let mut rng = SmallRng::seed_from_u64(DEMO_SEED);
    let world = WorldId::new(DEFAULT_WORLD);
    let host = runtime.host_mut();

    host.spawn_player("console", &world, 0.0, 0.0, Privileges::OPERATOR);
    for _ in 0..200 {
        let kind = match rng.gen_range(0..10) {
            0..=3 => ActorKind::Creature,
            4..=6 => ActorKind::GroundItem,
            7 => ActorKind::Vehicle,
            8 => ActorKind::ExperienceOrb,
            _ => ActorKind::Other,
        };
        let x = rng.gen_range(-400.0..400.0);
        let z = rng.gen_range(-400.0..400.0);
        host.spawn_actor(kind, &world, x, z);
    }
    info!(target: "tick_guard::server", actors = 201, "demo_population.seeded");
}

fn spawn_command_listener(bind_addr: SocketAddr) -> std::io::Result<Receiver<CommandRequest>> {
    let listener = TcpListener::bind(bind_addr)?;
    listener.set_nonblocking(true)?;

    let (sender, receiver) = unbounded::<CommandRequest>();
    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!(target: "tick_guard::server", %addr, "command_client.connected");
                let sender = sender.clone();
                thread::spawn(move || handle_client(stream, sender));
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                warn!(target: "tick_guard::server", error = %err, "command_client.accept_failed");
                thread::sleep(Duration::from_millis(200));
            }
        }
    });

    Ok(receiver)
}

fn handle_client(stream: TcpStream, sender: Sender<CommandRequest>) {
    if let Err(err) = stream.set_nonblocking(false) {
        warn!(target: "tick_guard::server", error = %err, "command_client.setup_failed");
        return;
    }
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(err) => {
            warn!(target: "tick_guard::server", error = %err, "command_client.setup_failed");
            return;
        }
    };
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let lines = match parse_command_line(trimmed) {
                    Ok(command) => {
                        let (reply_tx, reply_rx) = bounded(1);
                        let request = CommandRequest {
                            command,
                            reply: reply_tx,
                        };
                        if sender.send(request).is_err() {
                            break;
                        }
                        match reply_rx.recv() {
                            Ok(lines) => lines,
                            Err(_) => break,
                        }
                    }
                    Err(err) => {
                        warn!(
                            target: "tick_guard::server",
                            input = trimmed,
                            error = %err,
                            "command.rejected=parse_error"
                        );
                        vec![format!("error: {err}")]
                    }
                };
                if write_reply(&mut writer, &lines).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(target: "tick_guard::server", error = %err, "command_client.read_failed");
                break;
            }
        }
    }
}

fn write_reply(writer: &mut TcpStream, lines: &[String]) -> std::io::Result<()> {
    for line in lines {
        writeln!(writer, "{line}")?;
    }
    writer.flush()
}
