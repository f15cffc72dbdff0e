use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use rand::Rng;
use tokio::sync::mpsc;

use cinder_client::{start, validate, ClientConfig, SessionEvent, SessionHandle};

const DEFAULT_SERVER: &str = "ws://127.0.0.1:8765";
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_CODE_LEN: usize = 8;

#[derive(Debug)]
struct Config {
    server_url: String,
    room: String,
}

struct App {
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    room: String,
    log: Vec<String>,
    input: String,
    status: String,
    last_draw: Instant,
}

fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())] as char)
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let mut server_url = DEFAULT_SERVER.to_string();
    let mut room = String::new();

    // Minimal arg parsing
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" if i + 1 < args.len() => {
                server_url = args[i + 1].clone();
                i += 1;
            }
            other if room.is_empty() => room = other.to_string(),
            _ => {}
        }
        i += 1;
    }

    if room.is_empty() {
        room = generate_room_code();
        println!("Room code: {} (share it with your peer)", room);
    }

    if !validate::room_code(&room) {
        eprintln!("ERROR: room codes are 8-16 characters, A-Z and 0-9 only.");
        return Ok(());
    }

    let config = Config { server_url, room };

    let (handle, events) = match start(ClientConfig::new(&config.server_url, &config.room)).await {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Failed to start session: {}", e);
            return Ok(());
        }
    };

    let mut app = App {
        handle,
        events,
        room: config.room,
        log: Vec::new(),
        input: String::new(),
        status: "Starting...".to_string(),
        last_draw: Instant::now(),
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, Clear(ClearType::All), cursor::Hide)?;

    let result = app.run().await;

    disable_raw_mode()?;
    execute!(stdout, cursor::Show)?;
    if let Err(e) = result {
        println!("\nError: {}", e);
    }
    println!("\nSession ended.");
    Ok(())
}

impl App {
    async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.log.push(format!("Room: {}", self.room));
        self.log.push("Waiting for peer...".to_string());

        loop {
            if Instant::now().duration_since(self.last_draw) > Duration::from_millis(50) {
                self.draw()?;
                self.last_draw = Instant::now();
            }

            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(event) => {
                            if self.handle_session_event(event) {
                                self.draw()?;
                                return Ok(());
                            }
                        }
                        None => return Ok(()),
                    }
                }
                Ok(true) = tokio::task::spawn_blocking(|| {
                    event::poll(Duration::from_millis(10)).unwrap_or(false)
                }) => {
                    if let Event::Key(key) = event::read()? {
                        match key.code {
                            KeyCode::Enter => self.submit_input().await,
                            KeyCode::Char(c) => self.input.push(c),
                            KeyCode::Backspace => { self.input.pop(); }
                            KeyCode::Esc => {
                                let _ = self.handle.quit().await;
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    async fn submit_input(&mut self) {
        let text = std::mem::take(&mut self.input);
        if text == "/quit" {
            let _ = self.handle.quit().await;
            return;
        }
        if !validate::message(&text) {
            self.log
                .push("Messages must be 1-1000 characters.".to_string());
            return;
        }
        if self.handle.send_text(text.clone()).await.is_ok() {
            self.log.push(format!("You: {}", text));
        } else {
            self.log.push("Cannot send: session closed.".to_string());
        }
    }

    /// Returns true when the session is over.
    fn handle_session_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Searching => self.status = "SEARCHING".to_string(),
            SessionEvent::UserFound => {
                self.status = "PEER FOUND".to_string();
                self.log.push("Peer found. Starting handshake...".to_string());
            }
            SessionEvent::KeySetup => self.status = "KEY EXCHANGE".to_string(),
            SessionEvent::Connected => {
                self.status = "SECURE".to_string();
                self.log
                    .push("Encrypted channel established. Messages are end-to-end encrypted.".to_string());
            }
            SessionEvent::Message(text) => self.log.push(format!("Peer: {}", text)),
            SessionEvent::Disconnected => {
                self.status = "PEER LEFT".to_string();
                self.log.push("Peer disconnected.".to_string());
            }
            SessionEvent::Destroyed => {
                self.status = "DESTROYED".to_string();
                self.log.push("Session destroyed. Keys wiped.".to_string());
                return true;
            }
            SessionEvent::Error { code, message } => {
                self.log.push(format!("Error [{}]: {}", code, message));
            }
        }
        false
    }

    fn draw(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, cursor::MoveTo(0, 0))?;

        println!("cinder | Room: {} | Status: {}", self.room, self.status);
        println!("{}", "=".repeat(60));

        for i in 0..10 {
            execute!(stdout, cursor::MoveTo(0, 2 + i as u16))?;
            execute!(stdout, Clear(ClearType::CurrentLine))?;
            if let Some(line) = self.log.get(self.log.len().saturating_sub(10) + i) {
                println!("{}", line);
            }
        }

        execute!(stdout, cursor::MoveTo(0, 13))?;
        println!("{}", "-".repeat(60));
        execute!(stdout, Clear(ClearType::CurrentLine))?;
        print!("> {}", self.input);
        stdout.flush()?;
        Ok(())
    }
}
