//! Prometheus series for serving, training and offline evaluation.
//!
//! Every `AppContext` owns its own `Registry`, so two engines in one process
//! never share counts. `export` renders the text exposition format.

use models::Family;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;
use std::time::Duration;

use crate::evaluation::FamilyMetrics;

/// Why a request was answered from the popularity list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NoModel,
    NewUser,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::NoModel => "no_model",
            FallbackReason::NewUser => "new_user",
        }
    }
}

/// Label value of the `type` dimension on training series
fn train_type(partial: bool) -> &'static str {
    if partial { "partial" } else { "full" }
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Labels: result (hit, miss)
    cache_requests: IntCounterVec,
    /// Labels: reason
    popular_recommendations: IntCounterVec,
    /// Labels: model_type (popular, als, lightfm)
    recommendation_duration: HistogramVec,
    /// Labels: model_type
    model_loaded: IntGaugeVec,
    /// Labels: model
    matrix_size: IntGaugeVec,
    /// Labels: type, model, status
    train_count: IntCounterVec,
    /// Labels: type, model
    train_duration: HistogramVec,
    /// Labels: model
    precision_at_k: GaugeVec,
    recall_at_k: GaugeVec,
    evaluation_samples: IntGaugeVec,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrainingCounts {
    pub runs: u64,
    pub failures: u64,
}

/// Plain counter values, for logs and the CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub popular_no_model: u64,
    pub popular_new_user: u64,
    pub als_training: TrainingCounts,
    pub lightfm_training: TrainingCounts,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let cache_requests = IntCounterVec::new(
            Opts::new(
                "recommendation_cache_requests_total",
                "Recommendation cache lookups",
            ),
            &["result"],
        )?;
        let popular_recommendations = IntCounterVec::new(
            Opts::new(
                "popular_recommendations_total",
                "Total number of times popular recommendations were returned",
            ),
            &["reason"],
        )?;
        let recommendation_duration = HistogramVec::new(
            HistogramOpts::new(
                "recommendation_duration_seconds",
                "Time taken to generate recommendations",
            ),
            &["model_type"],
        )?;
        let model_loaded = IntGaugeVec::new(
            Opts::new(
                "model_loaded_status",
                "Status of model loading (1 = loaded, 0 = not loaded)",
            ),
            &["model_type"],
        )?;
        let matrix_size = IntGaugeVec::new(
            Opts::new(
                "matrix_size_elements",
                "Number of elements in the user-item matrix",
            ),
            &["model"],
        )?;
        let train_count = IntCounterVec::new(
            Opts::new("model_train_count_total", "Total model trainings"),
            &["type", "model", "status"],
        )?;
        let train_duration = HistogramVec::new(
            HistogramOpts::new("model_train_duration_seconds", "Model training duration")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]),
            &["type", "model"],
        )?;
        let precision_at_k = GaugeVec::new(
            Opts::new("model_precision_at_k", "Precision@K from logged feedback"),
            &["model"],
        )?;
        let recall_at_k = GaugeVec::new(
            Opts::new("model_recall_at_k", "Recall@K from logged feedback"),
            &["model"],
        )?;
        let evaluation_samples = IntGaugeVec::new(
            Opts::new(
                "model_evaluation_samples",
                "Number of sessions evaluated",
            ),
            &["model"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(cache_requests.clone()))?;
        registry.register(Box::new(popular_recommendations.clone()))?;
        registry.register(Box::new(recommendation_duration.clone()))?;
        registry.register(Box::new(model_loaded.clone()))?;
        registry.register(Box::new(matrix_size.clone()))?;
        registry.register(Box::new(train_count.clone()))?;
        registry.register(Box::new(train_duration.clone()))?;
        registry.register(Box::new(precision_at_k.clone()))?;
        registry.register(Box::new(recall_at_k.clone()))?;
        registry.register(Box::new(evaluation_samples.clone()))?;

        let metrics = Self {
            registry,
            cache_requests,
            popular_recommendations,
            recommendation_duration,
            model_loaded,
            matrix_size,
            train_count,
            train_duration,
            precision_at_k,
            recall_at_k,
            evaluation_samples,
        };
        for family in Family::ALL {
            metrics.model_loaded(family, false);
        }
        Ok(metrics)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache_hit(&self) {
        self.cache_requests.with_label_values(&["hit"]).inc();
    }

    pub fn cache_miss(&self) {
        self.cache_requests.with_label_values(&["miss"]).inc();
    }

    pub fn popular_fallback(&self, reason: FallbackReason) {
        self.popular_recommendations
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    /// Time spent computing one list, labelled by the source that served it
    pub fn recommendation_served(&self, model_type: &str, elapsed: Duration) {
        self.recommendation_duration
            .with_label_values(&[model_type])
            .observe(elapsed.as_secs_f64());
    }

    pub fn model_loaded(&self, family: Family, loaded: bool) {
        self.model_loaded
            .with_label_values(&[family.as_str()])
            .set(i64::from(loaded));
    }

    pub fn matrix_size(&self, family: Family, cells: usize) {
        self.matrix_size
            .with_label_values(&[family.as_str()])
            .set(i64::try_from(cells).unwrap_or(i64::MAX));
    }

    pub fn training_finished(
        &self,
        family: Family,
        partial: bool,
        elapsed: Duration,
        succeeded: bool,
    ) {
        let kind = train_type(partial);
        let status = if succeeded { "ok" } else { "failed" };
        self.train_count
            .with_label_values(&[kind, family.as_str(), status])
            .inc();
        self.train_duration
            .with_label_values(&[kind, family.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn evaluation(&self, family: Family, result: &FamilyMetrics) {
        let model = family.as_str();
        self.precision_at_k
            .with_label_values(&[model])
            .set(result.precision_at_k);
        self.recall_at_k
            .with_label_values(&[model])
            .set(result.recall_at_k);
        self.evaluation_samples
            .with_label_values(&[model])
            .set(i64::try_from(result.sample_count).unwrap_or(i64::MAX));
    }

    fn training_counts(&self, family: Family) -> TrainingCounts {
        let count = |kind: &str, status: &str| {
            self.train_count
                .with_label_values(&[kind, family.as_str(), status])
                .get()
        };
        let failures = count("full", "failed") + count("partial", "failed");
        TrainingCounts {
            runs: count("full", "ok") + count("partial", "ok") + failures,
            failures,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let popular = |reason: FallbackReason| {
            self.popular_recommendations
                .with_label_values(&[reason.as_str()])
                .get()
        };
        MetricsSnapshot {
            cache_hits: self.cache_requests.with_label_values(&["hit"]).get(),
            cache_misses: self.cache_requests.with_label_values(&["miss"]).get(),
            popular_no_model: popular(FallbackReason::NoModel),
            popular_new_user: popular(FallbackReason::NewUser),
            als_training: self.training_counts(Family::Als),
            lightfm_training: self.training_counts(Family::LightFm),
        }
    }

    /// Every series in the Prometheus text format
    pub fn export(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new().unwrap();
        metrics.cache_hit();
        metrics.cache_miss();
        metrics.cache_miss();
        metrics.popular_fallback(FallbackReason::NewUser);
        metrics.training_finished(Family::LightFm, false, Duration::from_millis(250), true);
        metrics.training_finished(Family::LightFm, true, Duration::from_millis(50), false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 2);
        assert_eq!(snapshot.popular_no_model, 0);
        assert_eq!(snapshot.popular_new_user, 1);
        assert_eq!(
            snapshot.lightfm_training,
            TrainingCounts {
                runs: 2,
                failures: 1
            }
        );
        assert_eq!(snapshot.als_training, TrainingCounts::default());
    }

    #[test]
    fn test_export_carries_labelled_series() {
        let metrics = Metrics::new().unwrap();
        metrics.popular_fallback(FallbackReason::NoModel);
        metrics.recommendation_served("popular", Duration::from_millis(3));
        metrics.model_loaded(Family::Als, true);
        metrics.matrix_size(Family::Als, 42);
        metrics.training_finished(Family::Als, false, Duration::from_secs(2), true);
        metrics.evaluation(
            Family::LightFm,
            &FamilyMetrics {
                precision_at_k: 0.5,
                recall_at_k: 0.25,
                sample_count: 4,
            },
        );

        let text = metrics.export().unwrap();
        assert!(text.contains(r#"popular_recommendations_total{reason="no_model"} 1"#));
        assert!(text.contains(r#"recommendation_duration_seconds_count{model_type="popular"} 1"#));
        assert!(text.contains(r#"model_loaded_status{model_type="als"} 1"#));
        assert!(text.contains(r#"model_loaded_status{model_type="lightfm"} 0"#));
        assert!(text.contains(r#"matrix_size_elements{model="als"} 42"#));
        assert!(text.contains(r#"model_train_count_total{model="als",status="ok",type="full"} 1"#));
        assert!(text.contains(r#"model_precision_at_k{model="lightfm"} 0.5"#));
        assert!(text.contains(r#"model_recall_at_k{model="lightfm"} 0.25"#));
        assert!(text.contains(r#"model_evaluation_samples{model="lightfm"} 4"#));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.cache_hit();
        assert_eq!(first.snapshot().cache_hits, 1);
        assert_eq!(second.snapshot().cache_hits, 0);
    }
}
