//! Interactive client front end

use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use routefs::client::Client;
use routefs::error::StoreError;
use routefs::protocol::Command;

const PROMPT: &str = "routefs$ ";

/// Run one command line and describe the result
pub async fn run_command<S>(client: &mut Client<S>, line: &str, out_dir: &Path) -> Result<String, StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	match Command::parse(line)? {
		Command::Upload { name, dest } => client.upload(Path::new(&name), &dest).await,
		Command::Download { path } => {
			let saved = client.download(&path, out_dir).await?;
			Ok(format!("File saved to {}", saved.display()))
		}
		Command::Remove { path } => client.remove(&path).await,
		Command::Archive { extension } => {
			let saved = client.archive(&extension, out_dir).await?;
			Ok(format!("Archive saved to {}", saved.display()))
		}
		Command::ListNames { path } => {
			let names = client.list(&path).await?;
			if names.is_empty() {
				Ok("No files found in the specified directory".to_string())
			} else {
				Ok(names.join("\n"))
			}
		}
	}
}

fn help_text() -> String {
	let mut text = String::from("Commands:\n");
	for usage in Command::usage() {
		text.push_str("  ");
		text.push_str(usage);
		text.push('\n');
	}
	text.push_str("  help\n  exit");
	text
}

/// Read commands from stdin until `exit`, EOF, or a broken connection
pub async fn run_shell<S>(client: &mut Client<S>, out_dir: &Path) -> Result<(), StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	let mut stdout = tokio::io::stdout();
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	println!("Connected. Type 'help' for the list of commands.");

	loop {
		stdout.write_all(PROMPT.as_bytes()).await?;
		stdout.flush().await?;

		let line = match lines.next_line().await? {
			Some(line) => line,
			None => return Ok(()),
		};
		match line.trim() {
			"" => continue,
			"exit" => return Ok(()),
			"help" => println!("{}", help_text()),
			command => match run_command(client, command, out_dir).await {
				Ok(message) => println!("{}", message),
				Err(e) if e.breaks_connection() => {
					eprintln!("Error: {}", e);
					return Err(e);
				}
				Err(e) => eprintln!("Error: {}", e),
			},
		}
	}
}

// vim: ts=4
