//! Simple example showing how to use mirror as a library
//!
//! Walks the full lifecycle: mirror a selection, edit through the
//! canonical side, edit through a second mirror, then diverge one mirror
//! and watch it detach while the others stay linked.

use anyhow::Result;
use mirror::{ChunkManager, ChunkOptions};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirror=debug".into()),
        )
        .init();

    println!("🪞 Mirror - Simple Example\n");

    let mut mgr = ChunkManager::new();
    let notes = mgr.create_buffer("notes.txt", "TODO: HELLOWORLD <- keep in sync");
    let draft = mgr.create_buffer("draft.txt", "status: __________");

    // Mirror "HELLOWORLD" out of notes.txt into a virtual chunk.
    let vc = mgr.create_chunk_from_selection(notes, 6, 16)?;
    println!("canonical text: {:?}", mgr.virtual_text(vc)?);

    // Second mirror of the same chunk inside draft.txt.
    mgr.create_chunk(vc, draft, 8, 18, ChunkOptions::default())?;
    println!("draft.txt:      {:?}\n", mgr.buffer_text(draft)?);

    // Edit the canonical side: insert "_" at offset 5.
    let canonical = mgr.virtual_chunk(vc).unwrap().buffer;
    mgr.edit(canonical, 5, 5, "_")?;
    println!("after canonical edit:");
    println!("  notes.txt: {:?}", mgr.buffer_text(notes)?);
    println!("  draft.txt: {:?}\n", mgr.buffer_text(draft)?);

    // Edit through the draft mirror; notes.txt follows.
    mgr.edit(draft, 8, 13, "HOWDY")?;
    println!("after mirror edit:");
    println!("  notes.txt: {:?}", mgr.buffer_text(notes)?);
    println!("  draft.txt: {:?}\n", mgr.buffer_text(draft)?);

    // Destroy the draft mirror's shape: delete across its begin boundary
    // plus some interior text in one notification. It detaches; the
    // notes.txt mirror keeps the chunk alive.
    mgr.edit_many(draft, &[(10, 14, ""), (6, 9, "")])?;
    println!("after divergent edit:");
    println!("  draft.txt: {:?}", mgr.buffer_text(draft)?);
    println!("  still linked mirrors: {}", mgr.chunks_of(vc).len());

    println!("\nstats: {}", serde_json::to_string_pretty(&mgr.stats())?);
    println!("\n✓ done");
    Ok(())
}
