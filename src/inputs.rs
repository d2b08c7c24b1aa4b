//! src/inputs.rs
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

/// Ask for a value of a given type on stdin. An empty answer returns the
/// default when one is provided; unparsable answers re-prompt.
pub fn prompt<T>(label: &str, default: Option<T>) -> io::Result<T>
where
    T: FromStr + Display,
{
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    prompt_with(&mut reader, &mut io::stdout(), label, default)
}

/// Ask a yes/no question on stdin. Accepts `y`, `yes`, `n`, and `no` in any
/// case; an empty answer returns the default when one is provided.
pub fn confirm(label: &str, default: Option<bool>) -> io::Result<bool> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    confirm_with(&mut reader, &mut io::stdout(), label, default)
}

pub fn prompt_with<T, R, W>(
    reader: &mut R,
    writer: &mut W,
    label: &str,
    mut default: Option<T>,
) -> io::Result<T>
where
    T: FromStr + Display,
    R: BufRead,
    W: Write,
{
    loop {
        match &default {
            Some(value) => write!(writer, "{} ({}): ", label, value)?,
            None => write!(writer, "{}: ", label)?,
        }
        writer.flush()?;

        let answer = read_answer(reader)?;

        if answer.is_empty() {
            if let Some(value) = default.take() {
                return Ok(value);
            }
            continue;
        }

        if let Ok(value) = answer.parse::<T>() {
            return Ok(value);
        }
    }
}

pub fn confirm_with<R, W>(
    reader: &mut R,
    writer: &mut W,
    label: &str,
    default: Option<bool>,
) -> io::Result<bool>
where
    R: BufRead,
    W: Write,
{
    let indicator = match default {
        None => "y/n",
        Some(true) => "Y/n",
        Some(false) => "y/N",
    };

    loop {
        write!(writer, "{} ({}): ", label, indicator)?;
        writer.flush()?;

        match read_answer(reader)?.to_lowercase().as_str() {
            "" => {
                if let Some(value) = default {
                    return Ok(value);
                }
            }
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
    }
}

fn read_answer<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        // A closed input stream would otherwise re-prompt forever.
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input stream closed",
        ));
    }
    Ok(line.trim().to_string())
}
