// src/urls/generator.rs
// =============================================================================
// Builds the set of candidate URLs from the catalog's filter facets.
//
// How it works:
// 1. The base URL is always a candidate
// 2. For every subset size r = 1..=number of facets, pick every r-sized
//    combination of facet names
// 3. For each combination, take the Cartesian product of the facet values
// 4. Every tuple becomes base/value1/value2/.../ (with a trailing slash)
//
// Combinations and products are two separate pure functions so each one can
// be tested on its own.
//
// The number of candidates grows exponentially with the number of facets,
// so this is only practical for a handful of facets with tens of values.
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};

use super::validator::{is_valid, normalize};

/// Facet name -> facet values. The BTreeMap keeps facet order stable, so
/// the same facets always produce the same combinations.
pub type FacetMap = BTreeMap<String, Vec<String>>;

/// Generates every candidate URL for the given facets.
///
/// The result always contains `base_url` itself. Candidates that fail
/// `is_valid` are dropped, duplicates collapse because the result is a set.
pub fn generate_urls(base_url: &str, facets: &FacetMap) -> BTreeSet<String> {
    let mut urls = BTreeSet::new();
    urls.insert(base_url.to_string());

    let base = base_url.trim_end_matches('/');
    let names: Vec<&String> = facets.keys().collect();

    for r in 1..=names.len() {
        for chosen in combinations(&names, r) {
            let value_lists: Vec<&[String]> =
                chosen.iter().map(|name| facets[*name].as_slice()).collect();

            for tuple in cartesian_product(&value_lists) {
                let url = normalize(&format!("{}/{}", base, tuple.join("/")));
                if is_valid(&url) {
                    urls.insert(url);
                }
            }
        }
    }

    urls
}

/// Number of combination URLs before validation and dedup:
/// the sum over every non-empty subset of facets of the product of their sizes.
///
/// Does not count the base URL.
pub fn candidate_count(facets: &FacetMap) -> usize {
    // (1 + k1)(1 + k2)...(1 + kn) expands to the sum over all subsets,
    // the empty subset contributes exactly 1
    facets
        .values()
        .fold(1usize, |acc, values| acc.saturating_mul(values.len() + 1))
        - 1
}

/// Every `k`-sized combination of `items`, without repetition, keeping the
/// relative order of the input.
///
/// Example: combinations(&[a, b, c], 2) -> [a, b], [a, c], [b, c]
pub fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    let n = items.len();
    if k > n {
        return Vec::new();
    }
    if k == 0 {
        return vec![Vec::new()];
    }

    let mut result = Vec::new();
    // indices always holds a strictly increasing selection
    let mut indices: Vec<usize> = (0..k).collect();

    loop {
        result.push(indices.iter().map(|&i| items[i].clone()).collect());

        // Find the rightmost index that can still move right
        let mut pos = k;
        while pos > 0 {
            pos -= 1;
            if indices[pos] < n - k + pos {
                break;
            }
            if pos == 0 {
                return result;
            }
        }

        indices[pos] += 1;
        for next in pos + 1..k {
            indices[next] = indices[next - 1] + 1;
        }
    }
}

/// The Cartesian product of the given lists, one element from each list,
/// in list order.
///
/// If any list is empty the product is empty. The product of no lists is
/// also empty, as there is no value to build a path from.
pub fn cartesian_product<T: Clone>(lists: &[&[T]]) -> Vec<Vec<T>> {
    if lists.is_empty() {
        return Vec::new();
    }

    lists.iter().fold(vec![Vec::new()], |acc, list| {
        acc.iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut tuple = prefix.clone();
                    tuple.push(item.clone());
                    tuple
                })
            })
            .collect()
    })
}
