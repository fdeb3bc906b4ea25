use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use crawlrank::config::PipelineConfig;
use crawlrank::driver::{round_dir, Pipeline};
use crawlrank::message::Message;
use crawlrank::record::PageRecord;
use crawlrank::workload::pagerank::{aggregate, propagate, RankParams};
use tempfile::TempDir;

fn html(links: &[&str]) -> String {
    let links: Vec<String> = links.iter().map(|l| format!(r#"{{"href":"{l}"}}"#)).collect();
    format!(
        r#"{{"disposition":"SUCCESS","content":{{"type":"html-doc","links":[{}]}}}}"#,
        links.join(",")
    )
}

/// Two shards; `http://d/` is linked to but never crawled.
fn write_shards(dir: &Path) -> Result<()> {
    let shard0 = [
        format!("http://a/\t{}", html(&["http://b/", "http://c/"])),
        format!("http://b/\t{}", html(&["http://a/"])),
        format!("http://e/\t{}", html(&["http://a/", "http://b/"])),
        format!("http://g/\t{}", html(&[])),
        format!("http://f/\t{}", r#"{"disposition":"FAILURE"}"#),
        "http://broken/\t{\"disposition\":".to_string(),
    ];
    let shard1 = [format!("http://c/\t{}", html(&["http://a/", "http://d/"]))];
    fs::write(dir.join("metadata-00000"), shard0.join("\n") + "\n")?;
    fs::write(dir.join("metadata-00001"), shard1.join("\n") + "\n")?;
    Ok(())
}

fn shard_glob(dir: &Path) -> String {
    format!("{}/metadata-*", dir.display())
}

/// Same rounds computed in memory.
fn reference(initial: Vec<PageRecord>, rounds: u32) -> HashMap<String, f64> {
    let params = RankParams::default();
    let mut current = initial;
    for _ in 0..rounds {
        let mut inbox: BTreeMap<String, Vec<Message>> = BTreeMap::new();
        for record in &current {
            for (dest, message) in propagate(record) {
                inbox.entry(dest).or_default().push(message);
            }
        }
        current = inbox
            .into_iter()
            .filter_map(|(url, messages)| aggregate(&url, messages, &params))
            .collect();
    }
    current.into_iter().map(|r| (r.url, r.rank)).collect()
}

fn read_listing(path: &Path) -> Result<Vec<(f64, String)>> {
    let mut entries = Vec::new();
    for line in fs::read_to_string(path)?.lines() {
        let (rank, url) = line.split_once('\t').expect("rank\\turl line");
        entries.push((rank.parse()?, url.to_string()));
    }
    Ok(entries)
}

fn round_urls(dir: &Path) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        for line in fs::read_to_string(&path)?.lines() {
            let record: PageRecord = line.parse()?;
            urls.push(record.url);
        }
    }
    urls.sort();
    Ok(urls)
}

fn links(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|u| u.to_string()).collect()
}

#[test]
fn full_pipeline_matches_in_memory_ranks() -> Result<()> {
    let temp = TempDir::new()?;
    write_shards(temp.path())?;
    let out = temp.path().join("out");
    let config = PipelineConfig::new(shard_glob(temp.path()), &out)?.with_partitions(4);

    let report = Pipeline::new(config).run()?;
    assert_eq!(report.stages.len(), 7);

    let round0 = round_urls(&round_dir(&out, 0))?;
    assert_eq!(round0, vec!["http://a/", "http://b/", "http://c/", "http://e/", "http://g/"]);
    for k in 1..=5 {
        let urls = round_urls(&round_dir(&out, k))?;
        assert_eq!(urls, round0, "round {k}");
    }

    let listing = read_listing(&report.listing)?;
    let descending = listing.windows(2).all(|w| w[0].0 >= w[1].0);
    assert!(descending, "listing not descending: {listing:?}");

    let expected = reference(
        vec![
            PageRecord::initial("http://a/", links(&["http://b/", "http://c/"])),
            PageRecord::initial("http://b/", links(&["http://a/"])),
            PageRecord::initial("http://c/", links(&["http://a/", "http://d/"])),
            PageRecord::initial("http://e/", links(&["http://a/", "http://b/"])),
            PageRecord::initial("http://g/", vec![]),
        ],
        5,
    );
    assert_eq!(listing.len(), expected.len());
    for (rank, url) in &listing {
        let want = expected[url];
        assert!((rank - want).abs() < 1e-9, "{url}: got {rank}, want {want}");
    }

    let ranks: HashMap<_, _> = listing.into_iter().map(|(r, u)| (u, r)).collect();
    assert_eq!(ranks["http://g/"], 0.15);
    assert_eq!(ranks["http://e/"], 0.15);
    assert!(!ranks.contains_key("http://d/"));
    Ok(())
}

#[test]
fn shard_cap_limits_the_graph() -> Result<()> {
    let temp = TempDir::new()?;
    write_shards(temp.path())?;
    let out = temp.path().join("out");
    let config = PipelineConfig::new(shard_glob(temp.path()), &out)?
        .with_max_shards(Some(1))
        .with_partitions(2);

    let report = Pipeline::new(config).run()?;
    let listing = read_listing(&report.listing)?;
    let urls: Vec<String> = listing.into_iter().map(|(_, u)| u).collect();
    assert_eq!(urls.len(), 4);
    assert!(!urls.contains(&"http://c/".to_string()));
    Ok(())
}

#[test]
fn rerun_replaces_previous_output() -> Result<()> {
    let temp = TempDir::new()?;
    write_shards(temp.path())?;
    let out = temp.path().join("out");
    fs::create_dir_all(out.join("stale"))?;
    let config = PipelineConfig::new(shard_glob(temp.path()), &out)?.with_partitions(1);

    Pipeline::new(config).run()?;
    assert!(!out.join("stale").exists());
    Ok(())
}

#[test]
fn binary_exit_codes() -> Result<()> {
    let bin = env!("CARGO_BIN_EXE_crawlrank");

    let missing = Command::new(bin).args(["--input", "x/*"]).output()?;
    assert_eq!(missing.status.code(), Some(1));

    let temp = TempDir::new()?;
    let no_shards = Command::new(bin)
        .arg("--input")
        .arg(format!("{}/nothing-*", temp.path().display()))
        .arg("--output")
        .arg(temp.path().join("out"))
        .output()?;
    assert_eq!(no_shards.status.code(), Some(1));

    write_shards(temp.path())?;
    let ok = Command::new(bin)
        .arg("--input")
        .arg(format!("{}/metadata-*", temp.path().display()))
        .arg("--output")
        .arg(temp.path().join("out"))
        .arg("--max-shards")
        .arg("2")
        .output()?;
    assert_eq!(ok.status.code(), Some(0));
    assert!(temp.path().join("out/ranked/mr-out-0").is_file());
    Ok(())
}
