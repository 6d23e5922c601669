//! Path validation and output folder handling for the CLI.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// User's choice when the output folder already has content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CleanupChoice {
    /// Clean folder before writing
    Yes,
    /// Don't clean, just overwrite matching files
    No,
}

impl CleanupChoice {
    /// Whether to clean the folder before writing.
    pub fn should_clean(&self) -> bool {
        matches!(self, Self::Yes)
    }

    /// Parse a prompt answer; anything unrecognised is `None`.
    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => Some(Self::Yes),
            "n" | "no" => Some(Self::No),
            _ => None,
        }
    }
}

/// Prompt the user for cleanup confirmation.
pub fn prompt_to_cleanup(folder_path: &Path) -> Result<CleanupChoice> {
    println!("Folder already exists: {folder_path:?}");
    print!("Cleanup? [Y]es / [N]o: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(CleanupChoice::from_answer(&input).unwrap_or_else(|| {
        println!("Invalid choice, defaulting to 'No'");
        CleanupChoice::No
    }))
}

/// Validate that the input folder exists and is a directory.
pub fn validate_input_folder(input: &Path) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input folder does not exist: {input:?}");
    }
    if !input.is_dir() {
        anyhow::bail!("Input path is not a directory: {input:?}");
    }
    Ok(())
}

/// Validate that an input file exists and is a regular file.
pub fn validate_input_file(input: &Path) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {input:?}");
    }
    if !input.is_file() {
        anyhow::bail!("Input path is not a file: {input:?}");
    }
    Ok(())
}

/// Clean an existing output folder if requested.
/// When `should_clean` is false the folder is left as-is and files are
/// overwritten.
pub fn clean_output(path: &Path, should_clean: bool) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    if path.is_file() {
        if should_clean {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove existing file: {path:?}"))?;
            println!("Removed existing file: {path:?}");
        }
    } else if path.is_dir() && !is_folder_empty(path)? && should_clean {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to clean output folder: {path:?}"))?;
        println!("Cleaned output folder: {path:?}");
    }

    Ok(())
}

/// Check if a folder is empty.
pub fn is_folder_empty(path: &Path) -> Result<bool> {
    let mut entries =
        fs::read_dir(path).with_context(|| format!("Failed to read directory: {path:?}"))?;
    Ok(entries.next().is_none())
}

// =============================================================================
// Unit Tests for utils module
// =============================================================================
