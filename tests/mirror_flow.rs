use anyhow::Result;
use mirror::{ChunkManager, ChunkOptions, ChunkTag};

fn tag(mgr: &ChunkManager, vc: mirror::VirtualChunkId) -> ChunkTag {
    let chunk = mgr.chunks_of(vc)[0];
    ChunkTag {
        virtual_chunk: vc,
        chunk,
    }
}

#[test]
fn create_edit_propagate_workflow() -> Result<()> {
    let mut mgr = ChunkManager::new();

    // Region [10, 20) of buffer A contains "HELLOWORLD".
    let a = mgr.create_buffer("a.txt", "##########HELLOWORLD##");
    let vc = mgr.create_chunk_from_selection(a, 10, 20)?;
    assert_eq!(mgr.virtual_text(vc)?, "HELLOWORLD");

    // An unrelated chunk that must never be touched.
    let b = mgr.create_buffer("b.txt", "unrelated text here");
    let other = mgr.create_chunk_from_selection(b, 0, 9)?;

    // Edit the canonical text: insert "_" at offset 5.
    let canonical = mgr.virtual_chunk(vc).unwrap().buffer;
    mgr.edit(canonical, 5, 5, "_")?;

    assert_eq!(mgr.virtual_text(vc)?, "HELLO_WORLD");
    assert_eq!(mgr.slice(a, 10, 21)?, "HELLO_WORLD");
    assert_eq!(mgr.buffer_text(a)?, "##########HELLO_WORLD##");

    assert_eq!(mgr.virtual_text(other)?, "unrelated");
    assert_eq!(mgr.buffer_text(b)?, "unrelated text here");
    Ok(())
}

#[test]
fn round_trip_after_create() -> Result<()> {
    let mut mgr = ChunkManager::new();
    let a = mgr.create_buffer("a.txt", "prefix PAYLOAD suffix");
    let vc = mgr.create_chunk_from_selection(a, 7, 14)?;
    let t = tag(&mgr, vc);

    assert_eq!(mgr.chunk_real_text(&t).unwrap(), "PAYLOAD");
    assert_eq!(mgr.chunk_virtual_text(&t).unwrap(), "PAYLOAD");
    Ok(())
}

#[test]
fn clean_edit_is_idempotent() -> Result<()> {
    let mut mgr = ChunkManager::new();
    let a = mgr.create_buffer("a.txt", "prefix PAYLOAD suffix");
    let vc = mgr.create_chunk_from_selection(a, 7, 14)?;

    // Overwrite the mirrored region with "X" and let propagation settle.
    mgr.edit(a, 7, 14, "X")?;
    assert_eq!(mgr.virtual_text(vc)?, "X");
    assert_eq!(mgr.buffer_text(a)?, "prefix X suffix");

    // Editing again through the virtual side converges to the same text.
    let canonical = mgr.virtual_chunk(vc).unwrap().buffer;
    mgr.edit(canonical, 0, 1, "X")?;
    assert_eq!(mgr.virtual_text(vc)?, "X");
    assert_eq!(mgr.buffer_text(a)?, "prefix X suffix");
    Ok(())
}

#[test]
fn three_mirrors_stay_in_sync() -> Result<()> {
    let mut mgr = ChunkManager::new();
    let a = mgr.create_buffer("a.txt", "[0123456789]");
    let b = mgr.create_buffer("b.txt", "____");
    let c = mgr.create_buffer("c.txt", "~~~~~~~~");
    let vc = mgr.create_chunk_from_selection(a, 1, 11)?;
    mgr.create_chunk(vc, b, 0, 4, ChunkOptions::default())?;
    mgr.create_chunk(vc, c, 2, 6, ChunkOptions::default())?;

    assert_eq!(mgr.buffer_text(b)?, "0123456789");
    assert_eq!(mgr.buffer_text(c)?, "~~0123456789~~");

    // Edit the mirror in B; A and C must follow.
    mgr.edit(b, 0, 2, "AB")?;
    assert_eq!(mgr.virtual_text(vc)?, "AB23456789");
    assert_eq!(mgr.buffer_text(a)?, "[AB23456789]");
    assert_eq!(mgr.buffer_text(c)?, "~~AB23456789~~");
    Ok(())
}

#[test]
fn boundary_stickiness() -> Result<()> {
    let mut mgr = ChunkManager::new();
    let a = mgr.create_buffer("a.txt", "..ABCDEF..");
    let vc = mgr.create_chunk_from_selection(a, 2, 8)?;

    // Typing right after the chunk's end becomes part of the chunk.
    mgr.edit(a, 8, 8, "!")?;
    assert_eq!(mgr.virtual_text(vc)?, "ABCDEF!");

    // Typing right before the chunk's start does not.
    mgr.edit(a, 2, 2, ">>")?;
    assert_eq!(mgr.virtual_text(vc)?, "ABCDEF!");
    assert_eq!(mgr.buffer_text(a)?, "..>>ABCDEF!..");
    Ok(())
}

#[test]
fn divergent_batch_detaches_without_failing_the_edit() -> Result<()> {
    let mut mgr = ChunkManager::new();
    let a = mgr.create_buffer("a.txt", "0123456789");
    let vc = mgr.create_chunk_from_selection(a, 2, 8)?;
    let t = tag(&mgr, vc);

    // One notification: an interior deletion plus a deletion crossing the
    // begin boundary. The surviving length cannot be reconciled against
    // the recorded clip offsets, so the chunk detaches.
    mgr.edit_many(a, &[(3, 5, ""), (0, 3, "")])?;

    assert!(mgr.descriptor(&t).is_none());
    assert_eq!(mgr.chunk_at(a, 1), None);
    // The sole mirror is gone, so the virtual chunk was reclaimed too.
    assert!(mgr.virtual_chunk(vc).is_none());

    // The span is ordinary text now: further edits stay local.
    mgr.edit(a, 0, 2, "zz")?;
    assert_eq!(mgr.buffer_text(a)?, "zz789");
    Ok(())
}

#[test]
fn killed_buffer_is_reclaimed() -> Result<()> {
    let mut mgr = ChunkManager::new();
    let a = mgr.create_buffer("a.txt", "canonical text");
    let b = mgr.create_buffer("b.txt", "..............");
    let vc = mgr.create_chunk_from_selection(a, 0, 9)?;
    mgr.create_chunk(vc, b, 0, 9, ChunkOptions::default())?;
    assert_eq!(mgr.chunks_of(vc).len(), 2);

    // Killing B invalidates its descriptor; cleanup purges it but the
    // virtual chunk survives on the strength of A's mirror.
    mgr.kill_buffer(b)?;
    mgr.cleanup(None);
    assert_eq!(mgr.chunks_of(vc).len(), 1);
    assert!(mgr.is_virtual_chunk_live(vc));

    // Killing the last mirror empties the registry and destroys the
    // virtual chunk entirely.
    mgr.kill_buffer(a)?;
    mgr.cleanup(None);
    assert!(mgr.virtual_chunk(vc).is_none());
    assert!(mgr.virtual_chunk_ids().is_empty());
    Ok(())
}

#[test]
fn relocation_survives_edge_clipping() -> Result<()> {
    let mut mgr = ChunkManager::new();
    let a = mgr.create_buffer("a.txt", "0123456789");
    let vc = mgr.create_chunk_from_selection(a, 2, 8)?;
    let t = tag(&mgr, vc);

    // Delete across the begin boundary: the payload tail survives, so the
    // chunk is repositioned instead of detached.
    mgr.edit(a, 0, 4, "")?;

    assert!(mgr.descriptor(&t).is_some());
    assert_eq!(mgr.virtual_text(vc)?, "234567");
    assert_eq!(mgr.chunk_real_text(&t).unwrap(), "4567");
    assert_eq!(mgr.chunk_virtual_text(&t).unwrap(), "4567");
    Ok(())
}

#[test]
fn stats_snapshot_serializes() -> Result<()> {
    let mut mgr = ChunkManager::new();
    let a = mgr.create_buffer("a.txt", "some text");
    mgr.create_chunk_from_selection(a, 0, 4)?;

    let stats = mgr.stats();
    assert_eq!(stats.virtual_chunks, 1);
    assert_eq!(stats.chunks, 1);

    let json = serde_json::to_value(stats)?;
    assert_eq!(json["virtual_chunks"], 1);
    assert_eq!(json["live_buffers"], 2);
    Ok(())
}
