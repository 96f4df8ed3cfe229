use super::*;

fn splitter(chunk_size: usize, chunk_overlap: usize) -> TextSplitter {
    TextSplitter::new(&ChunkingConfig {
        chunk_size,
        chunk_overlap,
    })
    .expect("valid chunking config")
}

fn page(text: &str, number: usize, total: usize) -> Page {
    Page {
        text: text.to_string(),
        number,
        total,
        source: "report.pdf".to_string(),
    }
}

#[test]
fn short_page_is_a_single_chunk() {
    let chunks = splitter(1000, 150).split_text("A short page of text.\nWith two lines.");
    assert_eq!(chunks, vec!["A short page of text.\nWith two lines."]);
}

#[test]
fn unbroken_text_splits_with_overlap() {
    let text: String = ('a'..='z').cycle().take(1800).collect();

    let chunks = splitter(1000, 150).split_text(&text);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], text.chars().take(1000).collect::<String>());
    assert_eq!(chunks[1], text.chars().skip(850).collect::<String>());
}

#[test]
fn words_carry_overlap_forward() {
    let chunks = splitter(10, 4).split_text("aaa bbb ccc ddd");
    assert_eq!(chunks, vec!["aaa bbb", "bbb ccc", "ccc ddd"]);
}

#[test]
fn paragraph_separator_starts_next_piece() {
    let chunks = splitter(20, 0).split_text("First para.\n\nSecond para.");
    assert_eq!(chunks, vec!["First para.", "Second para."]);
}

#[test]
fn long_pieces_fall_through_to_finer_separators() {
    let chunks = splitter(10, 0).split_text("short\n\nabcdefghijklmno");

    assert_eq!(chunks, vec!["short", "abcdefghi", "jklmno"]);
    assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 10));
}

#[test]
fn chunks_never_exceed_size() {
    let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n".repeat(80);
    let splitter = splitter(200, 30);

    let chunks = splitter.split_text(&text);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 200, "chunk too long: {}", chunk.len());
        assert_eq!(chunk.trim(), chunk);
        assert!(!chunk.is_empty());
    }
}

#[test]
fn lengths_count_characters_not_bytes() {
    let text = "é".repeat(15);
    let chunks = splitter(10, 0).split_text(&text);

    assert_eq!(chunks, vec!["é".repeat(10), "é".repeat(5)]);
}

#[test]
fn blank_text_yields_nothing() {
    assert!(splitter(100, 10).split_text("").is_empty());
    assert!(splitter(100, 10).split_text(" \n\n \n ").is_empty());
}

#[test]
fn pages_are_numbered_across_document() {
    let long_page = "word ".repeat(60);
    let pages = vec![
        page("Page one text.", 0, 3),
        page("   ", 1, 3),
        page(&long_page, 2, 3),
    ];

    let chunks = splitter(100, 20).split_pages(&pages);

    assert!(chunks.len() > 2);
    assert_eq!(chunks[0].text, "Page one text.");
    assert_eq!(chunks[0].metadata.page, 0);
    assert!(chunks[1..].iter().all(|chunk| chunk.metadata.page == 2));
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.metadata.chunk_index, i);
        assert_eq!(chunk.metadata.total_pages, 3);
        assert_eq!(chunk.metadata.source, "report.pdf");
    }
}

#[test]
fn invalid_config_is_rejected() {
    let result = TextSplitter::new(&ChunkingConfig {
        chunk_size: 100,
        chunk_overlap: 200,
    });
    assert!(matches!(result, Err(ConfigError::OverlapTooLarge { .. })));
}

#[test]
fn metadata_tolerates_missing_fields() {
    let metadata: ChunkMetadata =
        serde_json::from_str(r#"{"source": "report.pdf", "page": 4}"#).expect("should parse");

    assert_eq!(metadata.page, 4);
    assert_eq!(metadata.chunk_index, 0);
}
