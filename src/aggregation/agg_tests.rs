use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::Value;

use crate::aggregation::agg_req::Aggregations;
use crate::aggregation::intermediate_agg_result::IntermediateAggregationResults;
use crate::aggregation::tests::{exec_request_with_config, exec_request_with_query, get_test_index};
use crate::profiler::{REASON_AGGREGATION, REASON_AGGREGATION_GLOBAL};
use crate::{
    AggPhaseError, Document, Executor, Index, Query, QueryPhase, SearchConfig, SearchContext,
};

fn partitioned_config() -> SearchConfig {
    SearchConfig {
        concurrent_segment_search: true,
        ..Default::default()
    }
}

fn ten_docs_in_two_segments() -> crate::Result<Index> {
    let docs: Vec<Document> = (1..=10).map(|score| doc!("score" => score as f64)).collect();
    let (first, second) = docs.split_at(5);
    Index::from_segments(vec![first.to_vec(), second.to_vec()])
}

#[test]
fn test_count_with_global_top_n_over_two_partitions() -> crate::Result<()> {
    let index = ten_docs_in_two_segments()?;
    let searcher = index.searcher(Executor::multi_thread(2, "agg-scenario-")?);
    assert_eq!(searcher.slices(None).len(), 2);
    let agg_req: Aggregations = serde_json::from_value(json!({
        "count": { "count": {} },
        "top": { "top_n": { "field": "score", "size": 3 }, "global": true }
    }))?;
    let mut ctx = SearchContext::new(Query::All, partitioned_config())
        .with_aggregations(agg_req.clone());
    QueryPhase::execute(&mut ctx, &searcher)?;
    let merged = ctx.query_result_mut().take_aggregations().unwrap();
    assert_eq!(merged.names().collect::<Vec<_>>(), vec!["count", "top"]);
    let res = serde_json::to_value(merged.into_final_result(&agg_req)?)?;
    assert_eq!(
        res,
        json!({
            "count": { "value": 10.0 },
            "top": {
                "hits": [
                    { "sort_value": 10.0, "doc": { "segment_ord": 1, "doc_id": 4 } },
                    { "sort_value": 9.0, "doc": { "segment_ord": 1, "doc_id": 3 } },
                    { "sort_value": 8.0, "doc": { "segment_ord": 1, "doc_id": 2 } }
                ]
            }
        })
    );
    assert!(ctx.query_result_mut().take_aggregations().is_none());
    Ok(())
}

#[test]
fn test_global_aggregations_ignore_the_query() -> crate::Result<()> {
    let index = get_test_index()?;
    let agg_req: Aggregations = serde_json::from_value(json!({
        "matching": { "sum": { "field": "score" } },
        "everything": { "sum": { "field": "score" }, "global": true },
        "texts": {
            "terms": { "field": "text" },
            "global": true,
            "aggs": { "top": { "top_n": { "field": "score", "size": 1 } } }
        }
    }))?;
    let res = exec_request_with_query(agg_req, &index, Query::term("text", "nohit"))?;
    assert_eq!(res["matching"], json!({ "value": 21.0 }));
    assert_eq!(res["everything"], json!({ "value": 81.0 }));
    assert_eq!(
        res["texts"]["buckets"],
        json!([
            {
                "key": "cool",
                "doc_count": 5,
                "top": { "hits": [{ "sort_value": 44.0, "doc": { "segment_ord": 2, "doc_id": 0 } }] }
            },
            {
                "key": "nohit",
                "doc_count": 3,
                "top": { "hits": [{ "sort_value": 14.0, "doc": { "segment_ord": 2, "doc_id": 2 } }] }
            }
        ])
    );
    Ok(())
}

#[test]
fn test_pipeline_over_global_aggregation() -> crate::Result<()> {
    let index = get_test_index()?;
    let agg_req: Aggregations = serde_json::from_value(json!({
        "texts": { "terms": { "field": "text" }, "global": true },
        "matching_texts": { "terms": { "field": "text" } },
        "max_texts": { "max_bucket": { "buckets_path": "texts>_count" } },
        "max_matching_texts": { "max_bucket": { "buckets_path": "matching_texts>_count" } }
    }))?;
    let res = exec_request_with_query(agg_req, &index, Query::term("text", "nohit"))?;
    assert_eq!(res["max_texts"], json!({ "value": 5.0 }));
    assert_eq!(res["max_matching_texts"], json!({ "value": 3.0 }));
    Ok(())
}

fn terms_request() -> crate::Result<Aggregations> {
    Ok(serde_json::from_value(json!({
        "texts": { "terms": { "field": "text" } }
    }))?)
}

#[test]
fn test_bucket_limit_exact_maximum_succeeds() -> crate::Result<()> {
    let index = get_test_index()?;
    let config = SearchConfig {
        bucket_limit: 2,
        ..Default::default()
    };
    let res = exec_request_with_config(
        terms_request()?,
        &index,
        Query::All,
        config,
        Executor::single_thread(),
    )?;
    assert_eq!(res["texts"]["buckets"][0]["doc_count"], 5);
    Ok(())
}

#[test]
fn test_bucket_limit_exceeded_on_both_paths() -> crate::Result<()> {
    let index = get_test_index()?;
    for concurrent in [false, true] {
        let config = SearchConfig {
            bucket_limit: 1,
            concurrent_segment_search: concurrent,
            ..Default::default()
        };
        let err = exec_request_with_config(
            terms_request()?,
            &index,
            Query::All,
            config,
            Executor::multi_thread(3, "agg-limit-")?,
        )
        .unwrap_err();
        assert!(err.is_too_many_buckets(), "{err:?}");
    }
    Ok(())
}

#[test]
fn test_bucket_limit_counts_sub_aggregation_buckets() -> crate::Result<()> {
    let index = get_test_index()?;
    let agg_req: Aggregations = serde_json::from_value(json!({
        "texts": {
            "terms": { "field": "text" },
            "aggs": { "scores": { "histogram": { "field": "score", "interval": 10.0, "min_doc_count": 1 } } }
        }
    }))?;
    // 2 terms, 2 histogram buckets under "cool", 2 under "nohit".
    let config = |bucket_limit| SearchConfig {
        bucket_limit,
        ..Default::default()
    };
    exec_request_with_config(
        agg_req.clone(),
        &index,
        Query::All,
        config(6),
        Executor::single_thread(),
    )?;
    let err = exec_request_with_config(
        agg_req.clone(),
        &index,
        Query::All,
        config(5),
        Executor::single_thread(),
    )
    .unwrap_err();
    assert!(err.is_too_many_buckets());
    exec_request_with_config(
        agg_req,
        &index,
        Query::All,
        config(-1),
        Executor::single_thread(),
    )?;
    Ok(())
}

#[test]
fn test_global_pass_counts_into_the_same_limiter() -> crate::Result<()> {
    let index = get_test_index()?;
    let agg_req: Aggregations = serde_json::from_value(json!({
        "texts": { "terms": { "field": "text" } },
        "all_texts": { "terms": { "field": "text" }, "global": true }
    }))?;
    let config = |bucket_limit| SearchConfig {
        bucket_limit,
        ..Default::default()
    };
    exec_request_with_config(
        agg_req.clone(),
        &index,
        Query::All,
        config(4),
        Executor::single_thread(),
    )?;
    let err = exec_request_with_config(
        agg_req,
        &index,
        Query::All,
        config(3),
        Executor::single_thread(),
    )
    .unwrap_err();
    assert!(matches!(err, AggPhaseError::QueryExecution { .. }));
    assert!(err.is_too_many_buckets());
    Ok(())
}

#[test]
fn test_profiling_reasons() -> crate::Result<()> {
    let index = get_test_index()?;
    let searcher = index.searcher(Executor::multi_thread(3, "agg-profile-")?);
    let agg_req: Aggregations = serde_json::from_value(json!({
        "n": { "count": {} },
        "all": { "count": {}, "global": true }
    }))?;
    let mut ctx = SearchContext::new(Query::term("text", "cool"), partitioned_config())
        .with_aggregations(agg_req)
        .with_profiling();
    QueryPhase::execute(&mut ctx, &searcher)?;
    let query_profilers = ctx.profilers().unwrap().query_profilers();
    assert_eq!(query_profilers.len(), 2);
    let main = &query_profilers[0].collectors()[0];
    assert_eq!(main.reason(), REASON_AGGREGATION);
    assert_eq!(main.num_collected_docs(), 5);
    let global = &query_profilers[1].collectors()[0];
    assert_eq!(global.reason(), REASON_AGGREGATION_GLOBAL);
    assert_eq!(global.num_collected_docs(), 8);
    Ok(())
}

#[test]
fn test_timed_out_partitions_are_still_merged() -> crate::Result<()> {
    let index = get_test_index()?;
    let searcher = index.searcher(Executor::multi_thread(3, "agg-timeout-")?);
    let agg_req: Aggregations = serde_json::from_value(json!({
        "n": { "count": {} },
        "all": { "count": {}, "global": true }
    }))?;
    let config = SearchConfig {
        timeout_millis: Some(0),
        ..partitioned_config()
    };
    let mut ctx = SearchContext::new(Query::All, config).with_aggregations(agg_req.clone());
    QueryPhase::execute(&mut ctx, &searcher)?;
    assert!(ctx.query_result().timed_out());
    let merged = ctx.query_result_mut().take_aggregations().unwrap();
    let res = serde_json::to_value(merged.into_final_result(&agg_req)?)?;
    assert_eq!(res, json!({ "n": { "value": 0.0 }, "all": { "value": 8.0 } }));
    Ok(())
}

const TEXTS: [&str; 4] = ["a", "b", "c", "d"];

fn segments_strategy() -> impl Strategy<Value = Vec<Vec<(i32, usize)>>> {
    proptest::collection::vec(
        proptest::collection::vec((-60..60i32, 0..TEXTS.len()), 0..8usize),
        1..5usize,
    )
}

fn build_index(segments: &[Vec<(i32, usize)>]) -> crate::Result<Index> {
    Index::from_segments(
        segments
            .iter()
            .map(|segment| {
                segment
                    .iter()
                    .map(|(score, text)| doc!("score" => *score as f64, "text" => TEXTS[*text]))
                    .collect()
            })
            .collect(),
    )
}

fn invariance_request() -> Aggregations {
    serde_json::from_value(json!({
        "n": { "count": {} },
        "texts": {
            "terms": { "field": "text", "size": 2 },
            "aggs": { "s": { "sum": { "field": "score" } } }
        },
        "hist": { "histogram": { "field": "score", "interval": 25.0 } },
        "stats": { "stats": { "field": "score" } },
        "top": { "top_n": { "field": "score", "size": 3 } },
        "all_avg": { "avg": { "field": "score" }, "global": true },
        "best": { "max_bucket": { "buckets_path": "texts>s" } }
    }))
    .unwrap()
}

fn intermediate(agg_req: &Aggregations, index: &Index) -> crate::Result<IntermediateAggregationResults> {
    let searcher = index.searcher(Executor::single_thread());
    let mut ctx =
        SearchContext::new(Query::All, SearchConfig::default()).with_aggregations(agg_req.clone());
    QueryPhase::execute(&mut ctx, &searcher)?;
    Ok(ctx.query_result_mut().take_aggregations().unwrap_or_default())
}

fn final_json(
    results: IntermediateAggregationResults,
    agg_req: &Aggregations,
) -> crate::Result<Value> {
    Ok(serde_json::to_value(results.into_final_result(agg_req)?)?)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_partition_count_invariance(
        segments in segments_strategy(),
        max_slice_count in 1..5usize,
    ) {
        let index = build_index(&segments)?;
        let agg_req = invariance_request();
        let sequential = exec_request_with_config(
            agg_req.clone(),
            &index,
            Query::All,
            SearchConfig::default(),
            Executor::single_thread(),
        )?;
        let partitioned = exec_request_with_config(
            agg_req,
            &index,
            Query::All,
            SearchConfig {
                max_slice_count: Some(max_slice_count),
                ..partitioned_config()
            },
            Executor::multi_thread(max_slice_count, "agg-prop-")?,
        )?;
        prop_assert_eq!(sequential, partitioned);
    }

    #[test]
    fn test_merge_is_associative_and_order_independent(
        parts in proptest::collection::vec(segments_strategy(), 3),
    ) {
        let agg_req: Aggregations = serde_json::from_value(json!({
            "n": { "count": {} },
            "texts": {
                "terms": { "field": "text" },
                "aggs": { "s": { "sum": { "field": "score" } } }
            },
            "hist": { "histogram": { "field": "score", "interval": 25.0 } },
            "stats": { "stats": { "field": "score" } },
            "top": { "top_n": { "field": "score", "size": 3 } }
        }))?;
        let results = parts
            .iter()
            .map(|segments| intermediate(&agg_req, &build_index(segments)?))
            .collect::<crate::Result<Vec<_>>>()?;
        let (a, b, c) = (results[0].clone(), results[1].clone(), results[2].clone());

        let mut ab_c = a.clone();
        ab_c.merge_fruits(b.clone())?;
        ab_c.merge_fruits(c.clone())?;

        let mut bc = b.clone();
        bc.merge_fruits(c.clone())?;
        let mut a_bc = a.clone();
        a_bc.merge_fruits(bc)?;

        let mut c_a_b = c;
        c_a_b.merge_fruits(a)?;
        c_a_b.merge_fruits(b)?;

        let reduced = IntermediateAggregationResults::top_level_reduce(results, &agg_req, true)?;

        let expected = final_json(ab_c, &agg_req)?;
        prop_assert_eq!(&expected, &final_json(a_bc, &agg_req)?);
        prop_assert_eq!(&expected, &final_json(c_a_b, &agg_req)?);
        prop_assert_eq!(&expected, &final_json(reduced, &agg_req)?);
    }
}
