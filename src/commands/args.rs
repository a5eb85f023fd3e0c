use std::collections::BTreeMap;

/// Splits a command line on whitespace. Double quotes group words and are
/// removed; an unterminated quote runs to the end of the line.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Parses a duration such as `90`, `30m`, `12h`, `7d` or `2w` into seconds.
/// A bare number is seconds.
pub fn parse_duration(text: &str) -> Option<i64> {
    let text = text.trim();
    let (digits, unit) = match text.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&text[..i], c.to_ascii_lowercase()),
        _ => (text, 's'),
    };
    let value: i64 = digits.parse().ok().filter(|v| *v >= 0)?;
    let scale = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        'w' => 7 * 24 * 60 * 60,
        _ => return None,
    };
    value.checked_mul(scale)
}

/// Human form of a second count, largest unit first.
pub fn format_duration(mut secs: i64) -> String {
    if secs <= 0 {
        return "0s".to_string();
    }
    let mut parts = Vec::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        if secs >= size {
            parts.push(format!("{}{unit}", secs / size));
            secs %= size;
        }
    }
    parts.join(" ")
}

/// `-name value` style options following some positional arguments.
#[derive(Debug, Default)]
pub struct Switches {
    pub positional: Vec<String>,
    values: BTreeMap<String, String>,
}

impl Switches {
    /// Tokens before the first known switch are positional. A switch takes
    /// every following token up to the next known switch as its value.
    pub fn parse(args: &[String], known: &[&str]) -> Result<Self, String> {
        let mut switches = Switches::default();
        let mut current: Option<(String, Vec<String>)> = None;

        for arg in args {
            let lowered = arg.to_lowercase();
            if let Some(name) = lowered.strip_prefix('-').filter(|n| known.contains(n)) {
                if let Some((prev, words)) = current.take() {
                    switches.finish(prev, words)?;
                }
                current = Some((name.to_string(), Vec::new()));
                continue;
            }
            match current.as_mut() {
                Some((_, words)) => words.push(arg.clone()),
                None => switches.positional.push(arg.clone()),
            }
        }
        if let Some((prev, words)) = current {
            switches.finish(prev, words)?;
        }
        Ok(switches)
    }

    fn finish(&mut self, name: String, words: Vec<String>) -> Result<(), String> {
        if words.is_empty() {
            return Err(format!("missing value for -{name}"));
        }
        if self.values.contains_key(&name) {
            return Err(format!("-{name} given more than once"));
        }
        self.values.insert(name, words.join(" "));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
