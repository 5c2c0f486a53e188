use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;

use content_stager::dispatch::{Request, PAYLOAD_KEY};
use content_stager::envelope;

#[derive(Debug, Parser)]
#[command(author, version, about = "Decode a batch payload and print what it carries")]
struct Args {
    /// File holding either a request JSON or a bare encoded payload; stdin when omitted
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let raw = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let payload = match serde_json::from_str::<Request>(&raw) {
        Ok(req) => req
            .body
            .get(PAYLOAD_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .context("request has no payload")?,
        Err(_) => raw.trim().to_string(),
    };
    let batch = envelope::decode(&payload)?;

    println!("guid:            {}", batch.guid);
    println!("title:           {}", batch.title);
    println!("creator:         {}", batch.creator_id);
    println!("modified:        {}", batch.modified.to_rfc3339());
    println!("posts:           {}", batch.posts.len());
    for post in &batch.posts {
        println!(
            "  #{:<6} {:<12} parent={} ({}) meta={} terms={}",
            post.id,
            post.post_type,
            post.parent,
            post.parent_guid.as_deref().unwrap_or("-"),
            post.meta.len(),
            post.taxonomies.len()
        );
    }
    println!("term_taxonomies: {}", batch.term_taxonomies.len());
    println!("terms:           {}", batch.terms.len());
    println!("users:           {}", batch.users.len());
    println!("attachments:     {}", batch.attachments.len());
    for attachment in &batch.attachments {
        println!("  {} ({} urls)", attachment.path, attachment.sizes.len());
    }
    Ok(())
}
