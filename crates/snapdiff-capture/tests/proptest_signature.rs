//! Property tests for signature determinism and asset digest sensitivity.

use proptest::prelude::*;
use snapdiff_capture::{asset_bundle, build_signature_from_html};

fn page_from_parts(words: &[String], images: &[String]) -> String {
    let mut html = String::from("<html><head><title>t</title></head><body>");
    for word in words {
        html.push_str("<p>");
        html.push_str(word);
        html.push_str("</p>\n");
    }
    for src in images {
        html.push_str("<img src=\"");
        html.push_str(src);
        html.push_str("\">");
    }
    html.push_str("</body></html>");
    html
}

proptest! {
    #[test]
    fn building_twice_gives_identical_records(
        words in prop::collection::vec("[a-zA-Z0-9 ]{0,12}", 0..8),
        images in prop::collection::vec("/[a-z]{1,6}\\.png", 0..6),
        status in 100u16..600,
    ) {
        let html = page_from_parts(&words, &images);
        let first = build_signature_from_html("https://example.com/", status, &html);
        let second = build_signature_from_html("https://example.com/", status, &html);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn reordering_sources_only_moves_the_raw_digest(
        sources in prop::collection::vec("/[a-c]\\.png", 2..8),
    ) {
        let mut reordered = sources.clone();
        reordered.reverse();
        prop_assume!(reordered != sources);

        let original = asset_bundle(sources, Vec::new(), Vec::new());
        let shuffled = asset_bundle(reordered, Vec::new(), Vec::new());

        prop_assert_ne!(&original.imgs_list_hash, &shuffled.imgs_list_hash);
        prop_assert_eq!(&original.imgs_unique_hash, &shuffled.imgs_unique_hash);
        prop_assert_eq!(original.img_count, shuffled.img_count);
    }
}

#[test]
fn reordered_images_in_a_page_change_only_raw_digest() {
    let a = build_signature_from_html(
        "u",
        200,
        &page_from_parts(&[], &["/x.png".into(), "/y.png".into(), "/x.png".into()]),
    );
    let b = build_signature_from_html(
        "u",
        200,
        &page_from_parts(&[], &["/y.png".into(), "/x.png".into(), "/x.png".into()]),
    );
    let (a, b) = (&a.structure.assets, &b.structure.assets);
    assert_ne!(a.imgs_list_hash, b.imgs_list_hash);
    assert_eq!(a.imgs_unique_hash, b.imgs_unique_hash);
}
