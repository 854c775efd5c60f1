//! Interactive profile picker

use std::io::{self, BufRead, Write};

use crate::aws::profile::ProfileSummary;

pub fn print_menu<W: Write>(items: &[ProfileSummary], out: &mut W) -> io::Result<()> {
    writeln!(out, "Available AWS profiles:\n")?;
    writeln!(out, "  #  Profile                 Account ID       Role")?;
    writeln!(
        out,
        "  -- ----------------------  ---------------  -------------------------------"
    )?;
    for (i, item) in items.iter().enumerate() {
        writeln!(
            out,
            "  {:>2} {:<22.22}  {:<15.15}  {}",
            i + 1,
            item.name,
            item.account,
            item.role
        )?;
    }
    writeln!(out)?;
    writeln!(out, "Enter a number or profile name to select, or 'q' to quit.")
}

/// Read selections until one matches a profile
///
/// Returns `None` when the user quits or input ends.
pub fn choose_profile<R: BufRead, W: Write>(
    items: &[ProfileSummary],
    input: &mut R,
    out: &mut W,
) -> io::Result<Option<String>> {
    loop {
        write!(out, "Select profile> ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let choice = line.trim();

        if matches!(choice.to_ascii_lowercase().as_str(), "q" | "quit" | "exit") {
            return Ok(None);
        }

        // An exact profile name wins over a menu number
        let selected = items.iter().find(|item| item.name == choice).or_else(|| {
            choice
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| items.get(idx))
        });
        if let Some(item) = selected {
            return Ok(Some(item.name.clone()));
        }

        writeln!(out, "Invalid selection. Try again or type 'q' to quit.")?;
    }
}
