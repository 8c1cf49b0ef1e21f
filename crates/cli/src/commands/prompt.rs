//! Line-based operator prompt for interactive classification

use actor_factory::ClassPrompt;
use contracts::ClassId;
use std::io::{self, BufRead, Write};

/// Reads one class id per line, re-asking until the answer is an integer
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ClassPrompt for LinePrompt<R, W> {
    fn ask(&mut self, type_id: &str) -> io::Result<ClassId> {
        loop {
            write!(self.output, "class id for {type_id}: ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input closed before a class id was given",
                ));
            }
            match line.trim().parse::<ClassId>() {
                Ok(id) => return Ok(id),
                Err(_) => writeln!(self.output, "'{}' is not an integer", line.trim())?,
            }
        }
    }
}
