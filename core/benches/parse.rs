//! Parse benchmarks: tokenizing, the compound grammar and nodegroup expansion.

use std::collections::BTreeMap;
use tgt::{parse_compound, tokenize, NodegroupDef, Nodegroups};

fn main() {
    divan::main();
}

const TYPICAL: &str = "( G@os:Debian or G@os:Ubuntu ) and I@dc:name:dc0 and not L@web0,web4 or E@^db\\d+$";

#[divan::bench]
fn tokenize_typical() -> usize {
    tokenize(divan::black_box(TYPICAL)).len()
}

#[divan::bench]
fn parse_typical(bencher: divan::Bencher) {
    bencher.bench_local(|| parse_compound(divan::black_box(TYPICAL)));
}

#[divan::bench(args = [1, 10, 100])]
fn parse_long_chain(bencher: divan::Bencher, n: usize) {
    let expr = (0..n).map(|i| format!("web{i}*")).collect::<Vec<_>>().join(" or ");
    bencher.bench_local(|| parse_compound(&expr));
}

#[divan::bench(args = [1, 8, 32])]
fn parse_nested(bencher: divan::Bencher, depth: usize) {
    let expr = format!("{}a*{}", "( ".repeat(depth), " )".repeat(depth));
    bencher.bench_local(|| parse_compound(&expr));
}

/// A chain of groups, each referencing the next.
#[divan::bench(args = [1, 8, 24])]
fn expand_nodegroup_chain(bencher: divan::Bencher, n: usize) {
    let mut defs = BTreeMap::new();
    for i in 0..n {
        let def = if i + 1 < n {
            format!("web{i}* or N@g{}", i + 1)
        } else {
            "db1 db2 db3".to_owned()
        };
        defs.insert(format!("g{i}"), NodegroupDef::Expr(def));
    }
    let groups = Nodegroups::new(&defs);
    bencher.bench_local(|| groups.expand("g0"));
}
