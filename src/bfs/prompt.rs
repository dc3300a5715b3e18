/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Line prompting for interactive tools.

use std::io;
use std::io::BufRead;
use std::io::Write;

/// Shows `prompt`, then reads one line from stdin.
///
/// Returns `None` at end of input.
pub fn prompt(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = io::stdout().flush();
    io::stdin().lock().lines().next()?.ok()
}
