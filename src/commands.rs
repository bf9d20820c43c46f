use crate::bots::BOTS;

pub const HELP: &str = "Commands:
  /help             Show this help
  /bots             List available bots
  /use <id>         Switch to a different bot
  /quit             Exit";

/// One line of REPL input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Empty,
    Help,
    Bots,
    Use(Option<&'a str>),
    Quit,
    Unknown(&'a str),
    Ask(&'a str),
}

pub fn parse(line: &str) -> Command<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Ask(line);
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    match name {
        "/help" => Command::Help,
        "/bots" => Command::Bots,
        "/quit" => Command::Quit,
        "/use" => Command::Use((!rest.is_empty()).then_some(rest)),
        other => Command::Unknown(other),
    }
}

pub fn bot_list() -> String {
    let mut out = String::from("\nAvailable bots:\n");
    for bot in BOTS.iter() {
        out.push_str(&format!("  - {:<18} {} — {}\n", bot.id, bot.name, bot.description));
    }
    out
}
