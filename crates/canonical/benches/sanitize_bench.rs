use canonical::{extract_image_urls, sanitize_html, ImageAttrs, SanitizeConfig};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

fn sample_body(paragraphs: usize) -> String {
    let mut html = String::new();
    for i in 0..paragraphs {
        html.push_str(&format!(
            r#"<p style="margin:0">Paragraph {i} with <a href="https://example.com/{i}" onclick="t()">a link</a>.</p><img class="wp-image-{i}" src="https://cdn.example/{i}.jpg" srcset="https://cdn.example/{i}-300.jpg 300w">"#
        ));
        if i % 10 == 0 {
            html.push_str("<script>track()</script>");
        }
    }
    html
}

fn bench_sanitize(c: &mut Criterion) {
    let config = SanitizeConfig::default();
    let mut group = c.benchmark_group("sanitize");

    for paragraphs in [4, 32, 256].iter() {
        let html = sample_body(*paragraphs);
        group.throughput(Throughput::Bytes(html.len() as u64));
        group.bench_function(format!("sanitize_{paragraphs}"), |b| {
            b.iter(|| sanitize_html(black_box(&html), black_box(&config)))
        });
        group.bench_function(format!("extract_{paragraphs}"), |b| {
            b.iter(|| extract_image_urls(black_box(&html), ImageAttrs::All).expect("extract"))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sanitize);
criterion_main!(benches);
