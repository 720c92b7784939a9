//! Contains the intermediate aggregation tree, that can be merged.
//! Intermediate aggregation results are used to merge the results of the partitions of the
//! matching pass and of the global pass.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::agg_req::{Aggregation, AggregationVariants, Aggregations};
use super::agg_result::{
    AggregationResult, AggregationResults, BucketEntry, BucketResult, Key, MetricResult,
};
use super::bucket::{
    cmp_term_buckets, intermediate_histogram_buckets_to_final_buckets,
    num_empty_histogram_buckets, TermsAggregation,
};
use super::metric::{IntermediateStats, IntermediateTopN};
use super::pipeline::evaluate_pipelines;
use super::AggregationLimits;
use crate::AggPhaseError;

/// Contains the intermediate aggregation result, which is optimized to be merged with other
/// intermediate results.
///
/// Results are keyed by the user defined aggregation name.
#[derive(Default, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntermediateAggregationResults {
    pub(crate) aggs_res: BTreeMap<String, IntermediateAggregationResult>,
}

impl IntermediateAggregationResults {
    /// Adds the result of one aggregation. Fails if the name is already taken.
    pub(crate) fn push(
        &mut self,
        name: String,
        res: IntermediateAggregationResult,
    ) -> crate::Result<()> {
        if self.aggs_res.contains_key(&name) {
            return Err(AggPhaseError::InternalError(format!(
                "aggregation [{name}] has more than one result"
            )));
        }
        self.aggs_res.insert(name, res);
        Ok(())
    }

    /// Number of aggregations with a result.
    pub fn len(&self) -> usize {
        self.aggs_res.len()
    }

    /// Returns true if no aggregation has a result.
    pub fn is_empty(&self) -> bool {
        self.aggs_res.is_empty()
    }

    /// Returns the result of an aggregation.
    pub fn get(&self, name: &str) -> Option<&IntermediateAggregationResult> {
        self.aggs_res.get(name)
    }

    /// The names of the aggregations with a result, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.aggs_res.keys().map(String::as_str)
    }

    /// Convert intermediate result and its aggregation request to the final result.
    ///
    /// Aggregations of the request without a result get an empty result. Pipeline aggregations
    /// are evaluated last, once every other aggregation of their level is final.
    ///
    /// The empty histogram buckets created by the conversion count against
    /// [`DEFAULT_BUCKET_LIMIT`](super::DEFAULT_BUCKET_LIMIT). Use
    /// [`into_final_result_with_limits`](Self::into_final_result_with_limits) to choose the limit.
    pub fn into_final_result(self, req: &Aggregations) -> crate::Result<AggregationResults> {
        self.into_final_result_with_limits(req, &AggregationLimits::default())
    }

    /// Same as [`into_final_result`](Self::into_final_result), counting the empty histogram
    /// buckets against `limits`.
    pub fn into_final_result_with_limits(
        self,
        req: &Aggregations,
        limits: &AggregationLimits,
    ) -> crate::Result<AggregationResults> {
        self.into_final_result_internal(req, limits)
    }

    pub(crate) fn into_final_result_internal(
        self,
        req: &Aggregations,
        limits: &AggregationLimits,
    ) -> crate::Result<AggregationResults> {
        let mut aggs_res = self.aggs_res;
        let mut results: FxHashMap<String, AggregationResult> = FxHashMap::default();
        for (name, agg) in req {
            if agg.is_pipeline() {
                continue;
            }
            let res = match aggs_res.remove(name) {
                Some(res) => res,
                None => IntermediateAggregationResult::empty_from_req(agg).ok_or_else(|| {
                    AggPhaseError::InternalError(format!(
                        "no empty result for aggregation [{name}]"
                    ))
                })?,
            };
            results.insert(name.to_string(), res.into_final_result(agg, limits)?);
        }
        if let Some(name) = aggs_res.keys().next() {
            return Err(AggPhaseError::InternalError(format!(
                "aggregation [{name}] has a result but is not part of the request"
            )));
        }
        let mut results = AggregationResults(results);
        evaluate_pipelines(req, &mut results)?;
        Ok(results)
    }

    /// Creates an empty result for every non-pipeline aggregation of the request.
    pub(crate) fn empty_from_req(req: &Aggregations) -> Self {
        let aggs_res = req
            .iter()
            .filter_map(|(name, agg)| {
                IntermediateAggregationResult::empty_from_req(agg).map(|res| (name.clone(), res))
            })
            .collect();
        Self { aggs_res }
    }

    /// Merge another intermediate aggregation result into this result.
    ///
    /// Results are merged name by name. A name present on one side only is kept as is.
    pub fn merge_fruits(&mut self, other: IntermediateAggregationResults) -> crate::Result<()> {
        for (name, right) in other.aggs_res {
            match self.aggs_res.get_mut(&name) {
                Some(left) => left
                    .merge_fruits(right)
                    .map_err(|err| AggPhaseError::aggregation_execution(&name, err))?,
                None => {
                    self.aggs_res.insert(name, right);
                }
            }
        }
        Ok(())
    }

    /// Merges `results` into one result, then bounds its buckets.
    ///
    /// A `partial` reduction keeps `shard_size` terms per terms aggregation, since more results
    /// may be merged later. A final one keeps `size` terms.
    pub fn top_level_reduce(
        results: Vec<IntermediateAggregationResults>,
        req: &Aggregations,
        partial: bool,
    ) -> crate::Result<IntermediateAggregationResults> {
        let mut results = results.into_iter();
        let mut merged = results.next().unwrap_or_default();
        for res in results {
            merged.merge_fruits(res)?;
        }
        merged.normalize(req, partial)?;
        Ok(merged)
    }

    pub(crate) fn normalize(&mut self, req: &Aggregations, partial: bool) -> crate::Result<()> {
        for (name, res) in self.aggs_res.iter_mut() {
            let agg = req.get(name).ok_or_else(|| {
                AggPhaseError::InternalError(format!(
                    "aggregation [{name}] has a result but is not part of the request"
                ))
            })?;
            if let IntermediateAggregationResult::Bucket(bucket_res) = res {
                bucket_res.normalize(agg, partial)?;
            }
        }
        Ok(())
    }

    /// Accounts for the empty histogram buckets the final conversion fills in, sub-aggregations
    /// included.
    pub(crate) fn reserve_empty_buckets(
        &self,
        req: &Aggregations,
        limits: &AggregationLimits,
    ) -> crate::Result<()> {
        for (name, res) in &self.aggs_res {
            if let (Some(agg), IntermediateAggregationResult::Bucket(bucket_res)) =
                (req.get(name), res)
            {
                bucket_res.reserve_empty_buckets(agg, limits)?;
            }
        }
        Ok(())
    }

    /// Number of buckets in the tree, sub-aggregation buckets included.
    pub fn bucket_count(&self) -> u64 {
        self.aggs_res
            .values()
            .map(|res| match res {
                IntermediateAggregationResult::Bucket(bucket_res) => bucket_res.bucket_count(),
                IntermediateAggregationResult::Metric(_) => 0,
            })
            .sum()
    }
}

/// An aggregation is either a bucket or a metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IntermediateAggregationResult {
    /// Bucket variant
    Bucket(IntermediateBucketResult),
    /// Metric variant
    Metric(IntermediateMetricResult),
}

impl IntermediateAggregationResult {
    /// Returns `None` for pipeline aggregations, which have no intermediate result.
    pub(crate) fn empty_from_req(req: &Aggregation) -> Option<Self> {
        let res = match &req.agg {
            AggregationVariants::Terms(_) => {
                IntermediateAggregationResult::Bucket(IntermediateBucketResult::Terms(
                    IntermediateTermBucketResult::default(),
                ))
            }
            AggregationVariants::Histogram(_) => {
                IntermediateAggregationResult::Bucket(IntermediateBucketResult::Histogram {
                    buckets: Vec::new(),
                })
            }
            AggregationVariants::Count(_) => {
                IntermediateAggregationResult::Metric(IntermediateMetricResult::Count(0))
            }
            AggregationVariants::Sum(_) => IntermediateAggregationResult::Metric(
                IntermediateMetricResult::Sum(IntermediateStats::default()),
            ),
            AggregationVariants::Average(_) => IntermediateAggregationResult::Metric(
                IntermediateMetricResult::Average(IntermediateStats::default()),
            ),
            AggregationVariants::Min(_) => IntermediateAggregationResult::Metric(
                IntermediateMetricResult::Min(IntermediateStats::default()),
            ),
            AggregationVariants::Max(_) => IntermediateAggregationResult::Metric(
                IntermediateMetricResult::Max(IntermediateStats::default()),
            ),
            AggregationVariants::Stats(_) => IntermediateAggregationResult::Metric(
                IntermediateMetricResult::Stats(IntermediateStats::default()),
            ),
            AggregationVariants::TopN(top_n) => IntermediateAggregationResult::Metric(
                IntermediateMetricResult::TopN(IntermediateTopN::empty(top_n.size)),
            ),
            AggregationVariants::SumBucket(_)
            | AggregationVariants::AvgBucket(_)
            | AggregationVariants::MaxBucket(_)
            | AggregationVariants::MinBucket(_) => return None,
        };
        Some(res)
    }

    fn into_final_result(
        self,
        req: &Aggregation,
        limits: &AggregationLimits,
    ) -> crate::Result<AggregationResult> {
        let res = match self {
            IntermediateAggregationResult::Bucket(bucket) => {
                AggregationResult::BucketResult(bucket.into_final_bucket_result(req, limits)?)
            }
            IntermediateAggregationResult::Metric(metric) => {
                AggregationResult::MetricResult(metric.into_final_metric_result())
            }
        };
        Ok(res)
    }

    fn merge_fruits(&mut self, other: IntermediateAggregationResult) -> crate::Result<()> {
        match (self, other) {
            (
                IntermediateAggregationResult::Bucket(bucket_left),
                IntermediateAggregationResult::Bucket(bucket_right),
            ) => bucket_left.merge_fruits(bucket_right),
            (
                IntermediateAggregationResult::Metric(metric_left),
                IntermediateAggregationResult::Metric(metric_right),
            ) => metric_left.merge_fruits(metric_right),
            _ => Err(incompatible_fruits()),
        }
    }
}

fn incompatible_fruits() -> AggPhaseError {
    AggPhaseError::InternalError("incompatible fruit types in tree".to_string())
}

/// Holds the intermediate data for metric results
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IntermediateMetricResult {
    /// Intermediate count result.
    Count(u64),
    /// Intermediate average result.
    Average(IntermediateStats),
    /// Intermediate max result.
    Max(IntermediateStats),
    /// Intermediate min result.
    Min(IntermediateStats),
    /// Intermediate stats result.
    Stats(IntermediateStats),
    /// Intermediate sum result.
    Sum(IntermediateStats),
    /// Intermediate top_n result.
    TopN(IntermediateTopN),
}

impl IntermediateMetricResult {
    fn into_final_metric_result(self) -> MetricResult {
        match self {
            IntermediateMetricResult::Count(count) => MetricResult::Count((count as f64).into()),
            IntermediateMetricResult::Average(stats) => {
                MetricResult::Average(stats.finalize().avg.into())
            }
            IntermediateMetricResult::Max(stats) => MetricResult::Max(stats.finalize().max.into()),
            IntermediateMetricResult::Min(stats) => MetricResult::Min(stats.finalize().min.into()),
            IntermediateMetricResult::Stats(stats) => MetricResult::Stats(stats.finalize()),
            IntermediateMetricResult::Sum(stats) => MetricResult::Sum(stats.finalize().sum.into()),
            IntermediateMetricResult::TopN(top_n) => MetricResult::TopN(top_n.finalize()),
        }
    }

    fn merge_fruits(&mut self, other: IntermediateMetricResult) -> crate::Result<()> {
        match (self, other) {
            (IntermediateMetricResult::Count(left), IntermediateMetricResult::Count(right)) => {
                *left += right;
            }
            (IntermediateMetricResult::Average(left), IntermediateMetricResult::Average(right))
            | (IntermediateMetricResult::Max(left), IntermediateMetricResult::Max(right))
            | (IntermediateMetricResult::Min(left), IntermediateMetricResult::Min(right))
            | (IntermediateMetricResult::Stats(left), IntermediateMetricResult::Stats(right))
            | (IntermediateMetricResult::Sum(left), IntermediateMetricResult::Sum(right)) => {
                left.merge_fruits(right);
            }
            (IntermediateMetricResult::TopN(left), IntermediateMetricResult::TopN(right)) => {
                left.merge_fruits(right);
            }
            _ => return Err(incompatible_fruits()),
        }
        Ok(())
    }
}

/// The intermediate bucket results. Internally they can be easily merged via the keys of the
/// buckets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IntermediateBucketResult {
    /// This is the histogram entry for a bucket, which contains a key, count, and optionally
    /// sub_aggregations.
    Histogram {
        /// The buckets, sorted by key.
        buckets: Vec<IntermediateHistogramBucketEntry>,
    },
    /// Term aggregation
    Terms(IntermediateTermBucketResult),
}

impl IntermediateBucketResult {
    pub(crate) fn into_final_bucket_result(
        self,
        req: &Aggregation,
        limits: &AggregationLimits,
    ) -> crate::Result<BucketResult> {
        match (self, &req.agg) {
            (
                IntermediateBucketResult::Histogram { buckets },
                AggregationVariants::Histogram(histogram_req),
            ) => {
                let buckets = intermediate_histogram_buckets_to_final_buckets(
                    buckets,
                    histogram_req,
                    &req.sub_aggregation,
                    limits,
                )?;
                Ok(BucketResult::Histogram { buckets })
            }
            (IntermediateBucketResult::Terms(terms), AggregationVariants::Terms(terms_req)) => {
                terms.into_final_result(terms_req, &req.sub_aggregation, limits)
            }
            _ => Err(AggPhaseError::InternalError(
                "bucket result does not match its aggregation request".to_string(),
            )),
        }
    }

    fn normalize(&mut self, req: &Aggregation, partial: bool) -> crate::Result<()> {
        match (self, &req.agg) {
            (IntermediateBucketResult::Histogram { buckets }, AggregationVariants::Histogram(_)) => {
                for bucket in buckets {
                    bucket
                        .sub_aggregation
                        .normalize(&req.sub_aggregation, partial)?;
                }
            }
            (IntermediateBucketResult::Terms(terms), AggregationVariants::Terms(terms_req)) => {
                let kept = terms.cut_off(terms_req, partial);
                let mut entries =
                    FxHashMap::with_capacity_and_hasher(kept.len(), Default::default());
                for (key, mut entry) in kept {
                    entry
                        .sub_aggregation
                        .normalize(&req.sub_aggregation, partial)?;
                    entries.insert(key, entry);
                }
                terms.entries = entries;
            }
            _ => {
                return Err(AggPhaseError::InternalError(
                    "bucket result does not match its aggregation request".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn reserve_empty_buckets(
        &self,
        req: &Aggregation,
        limits: &AggregationLimits,
    ) -> crate::Result<()> {
        match (self, &req.agg) {
            (
                IntermediateBucketResult::Histogram { buckets },
                AggregationVariants::Histogram(histogram_req),
            ) => {
                if histogram_req.min_doc_count() == 0 {
                    limits.add_buckets(num_empty_histogram_buckets(
                        buckets,
                        histogram_req,
                        limits,
                    )?)?;
                }
                for bucket in buckets {
                    bucket
                        .sub_aggregation
                        .reserve_empty_buckets(&req.sub_aggregation, limits)?;
                }
            }
            (IntermediateBucketResult::Terms(terms), _) => {
                for entry in terms.entries.values() {
                    entry
                        .sub_aggregation
                        .reserve_empty_buckets(&req.sub_aggregation, limits)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn bucket_count(&self) -> u64 {
        match self {
            IntermediateBucketResult::Histogram { buckets } => buckets
                .iter()
                .map(|bucket| 1 + bucket.sub_aggregation.bucket_count())
                .sum(),
            IntermediateBucketResult::Terms(terms) => terms
                .entries
                .values()
                .map(|entry| 1 + entry.sub_aggregation.bucket_count())
                .sum(),
        }
    }

    fn merge_fruits(&mut self, other: IntermediateBucketResult) -> crate::Result<()> {
        match (self, other) {
            (
                IntermediateBucketResult::Terms(term_res_left),
                IntermediateBucketResult::Terms(term_res_right),
            ) => {
                merge_key_maps(&mut term_res_left.entries, term_res_right.entries)?;
                term_res_left.sum_other_doc_count += term_res_right.sum_other_doc_count;
            }
            (
                IntermediateBucketResult::Histogram {
                    buckets: buckets_left,
                },
                IntermediateBucketResult::Histogram {
                    buckets: buckets_right,
                },
            ) => {
                let buckets: crate::Result<Vec<IntermediateHistogramBucketEntry>> = buckets_left
                    .drain(..)
                    .merge_join_by(buckets_right, |left, right| {
                        left.key.partial_cmp(&right.key).unwrap_or(Ordering::Equal)
                    })
                    .map(|either| match either {
                        itertools::EitherOrBoth::Both(mut left, right) => {
                            left.merge_fruits(right)?;
                            Ok(left)
                        }
                        itertools::EitherOrBoth::Left(left) => Ok(left),
                        itertools::EitherOrBoth::Right(right) => Ok(right),
                    })
                    .collect();
                *buckets_left = buckets?;
            }
            _ => return Err(incompatible_fruits()),
        }
        Ok(())
    }
}

/// Term aggregation including the doc count of the terms that were cut off.
#[derive(Default, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntermediateTermBucketResult {
    pub(crate) entries: FxHashMap<String, IntermediateTermBucketEntry>,
    pub(crate) sum_other_doc_count: u64,
}

impl IntermediateTermBucketResult {
    /// Sorts the entries and keeps the best `shard_size` (partial) or `size` (final) ones. The
    /// doc count of the others is added to `sum_other_doc_count`.
    ///
    /// A final cut off also drops the terms under `min_doc_count`.
    fn cut_off(
        &mut self,
        req: &TermsAggregation,
        partial: bool,
    ) -> Vec<(String, IntermediateTermBucketEntry)> {
        let min_doc_count = if partial { 0 } else { req.min_doc_count() };
        let mut entries: Vec<(String, IntermediateTermBucketEntry)> = self
            .entries
            .drain()
            .filter(|(_, entry)| entry.doc_count >= min_doc_count)
            .collect();
        entries.sort_unstable_by(cmp_term_buckets);
        let keep = if partial { req.shard_size() } else { req.size() };
        if entries.len() > keep {
            self.sum_other_doc_count += entries
                .drain(keep..)
                .map(|(_, entry)| entry.doc_count)
                .sum::<u64>();
        }
        entries
    }

    pub(crate) fn into_final_result(
        mut self,
        req: &TermsAggregation,
        sub_aggregation_req: &Aggregations,
        limits: &AggregationLimits,
    ) -> crate::Result<BucketResult> {
        let buckets = self
            .cut_off(req, false)
            .into_iter()
            .map(|(key, entry)| {
                Ok(BucketEntry {
                    key: Key::Str(key),
                    doc_count: entry.doc_count,
                    sub_aggregation: entry
                        .sub_aggregation
                        .into_final_result_internal(sub_aggregation_req, limits)?,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(BucketResult::Terms {
            buckets,
            sum_other_doc_count: self.sum_other_doc_count,
        })
    }
}

trait MergeFruits {
    fn merge_fruits(&mut self, other: Self) -> crate::Result<()>;
}

fn merge_key_maps<V: MergeFruits>(
    entries_left: &mut FxHashMap<String, V>,
    entries_right: FxHashMap<String, V>,
) -> crate::Result<()> {
    for (key, entry_right) in entries_right {
        match entries_left.get_mut(&key) {
            Some(entry_left) => entry_left.merge_fruits(entry_right)?,
            None => {
                entries_left.insert(key, entry_right);
            }
        }
    }
    Ok(())
}

/// This is the histogram entry for a bucket, which contains a key, count, and optionally
/// sub_aggregations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntermediateHistogramBucketEntry {
    /// The unique the bucket is identified.
    pub key: f64,
    /// The number of documents in the bucket.
    pub doc_count: u64,
    /// The sub_aggregation in this bucket.
    pub sub_aggregation: IntermediateAggregationResults,
}

/// This is the term entry for a bucket, which contains a count, and optionally
/// sub_aggregations.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntermediateTermBucketEntry {
    /// The number of documents in the bucket.
    pub doc_count: u64,
    /// The sub_aggregation in this bucket.
    pub sub_aggregation: IntermediateAggregationResults,
}

impl MergeFruits for IntermediateTermBucketEntry {
    fn merge_fruits(&mut self, other: IntermediateTermBucketEntry) -> crate::Result<()> {
        self.doc_count += other.doc_count;
        self.sub_aggregation.merge_fruits(other.sub_aggregation)?;
        Ok(())
    }
}

impl MergeFruits for IntermediateHistogramBucketEntry {
    fn merge_fruits(&mut self, other: IntermediateHistogramBucketEntry) -> crate::Result<()> {
        self.doc_count += other.doc_count;
        self.sub_aggregation.merge_fruits(other.sub_aggregation)?;
        Ok(())
    }
}
