/// Available commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  /// Placeholder of the argument, for commands that take one
  pub arg: Option<&'static str>,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "events",
    aliases: &["e", "list", "ls"],
    description: "Browse all events",
    arg: None,
  },
  Command {
    name: "new",
    aliases: &["n", "create", "add"],
    description: "Create a new event",
    arg: None,
  },
  Command {
    name: "open",
    aliases: &["o", "show", "event"],
    description: "Open an event by id",
    arg: Some("<id>"),
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit evdesk",
    arg: None,
  },
];

/// A command line resolved to something the app can run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaletteCommand {
  Events,
  New,
  Open(String),
  Quit,
}

/// Parse a submitted command line such as `open 42`.
pub fn parse(input: &str) -> Result<PaletteCommand, String> {
  let mut parts = input.split_whitespace();
  let name = parts.next().unwrap_or_default().to_lowercase();
  let arg = parts.next();

  let command = COMMANDS
    .iter()
    .find(|cmd| cmd.name == name || cmd.aliases.contains(&name.as_str()))
    .ok_or_else(|| format!("Unknown command: {}", input.trim()))?;

  match (command.name, arg) {
    ("events", _) => Ok(PaletteCommand::Events),
    ("new", _) => Ok(PaletteCommand::New),
    ("open", Some(id)) => Ok(PaletteCommand::Open(id.to_string())),
    ("open", None) => Err("Usage: open <id>".to_string()),
    _ => Ok(PaletteCommand::Quit),
  }
}

/// Get autocomplete suggestions for a given input
///
/// Only the command word is matched; once an argument is being typed the
/// suggestions narrow to the command it belongs to.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim_start().to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  if let Some((word, _)) = input_lower.split_once(' ') {
    return COMMANDS
      .iter()
      .filter(|cmd| cmd.arg.is_some() && (cmd.name == word || cmd.aliases.contains(&word)))
      .collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
