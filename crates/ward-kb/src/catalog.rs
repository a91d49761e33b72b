use crate::case::{Case, Severity, SymptomPattern, TrajectoryShape};

struct Seed {
    id: &'static str,
    symptoms: &'static str,
    pattern: fn() -> SymptomPattern,
    root_cause: &'static str,
    solution: &'static str,
    severity: Severity,
    impact: &'static [&'static str],
    detection: &'static str,
}

const SEEDS: &[Seed] = &[
    Seed {
        id: "OOM_001",
        symptoms: "Memory climbed from 60% to 98% within five minutes",
        pattern: || {
            SymptomPattern::shape(TrajectoryShape::RapidIncrease)
                .peak(90.0)
                .rise(35.0)
        },
        root_cause: "Model shards are loaded but never released",
        solution: "Upgrade the shard loader to v2.3 or later",
        severity: Severity::Critical,
        impact: &["Video processing is interrupted", "The host may crash"],
        detection: "Usage grew by more than 35 points within a short window",
    },
    Seed {
        id: "OOM_002",
        symptoms: "Memory grows slowly, is never released and ends above 95%",
        pattern: || SymptomPattern::shape(TrajectoryShape::SteadyIncrease).peak(90.0),
        root_cause: "Video buffers are not released between jobs",
        solution: "Force a collection and clear buffers explicitly when switching videos",
        severity: Severity::High,
        impact: &["The system slows down", "Memory eventually runs out"],
        detection: "Usage does not drop noticeably after a collection",
    },
    Seed {
        id: "OOM_003",
        symptoms: "Memory jumps above 90% while a large video is processed",
        pattern: || {
            SymptomPattern::shape(TrajectoryShape::Spike)
                .peak(90.0)
                .rise(40.0)
                .context("input_size", "large")
        },
        root_cause: "The video decode buffer is oversized",
        solution: "Decode in streaming mode and cap the buffer size",
        severity: Severity::High,
        impact: &["Large videos fail to process"],
        detection: "Usage jumped by more than 40 points at once",
    },
    Seed {
        id: "FRAG_001",
        symptoms: "Usage is moderate but new allocations fail",
        pattern: || {
            SymptomPattern::shape(TrajectoryShape::Fragmentation).context("allocation", "fail")
        },
        root_cause: "Long uptime has fragmented the heap",
        solution: "Restart the service periodically or switch to a compacting allocator",
        severity: Severity::Medium,
        impact: &["Large videos fail to process", "The system becomes unstable"],
        detection: "Allocations fail while usage is below 70%",
    },
    Seed {
        id: "FRAG_002",
        symptoms: "The system slows down after running for a long time while usage stays modest",
        pattern: || SymptomPattern::shape(TrajectoryShape::Fragmentation).context("uptime", "long"),
        root_cause: "Subtitle processing fragments memory",
        solution: "Tighten subtitle cache management and compact memory periodically",
        severity: Severity::Low,
        impact: &["Throughput degrades"],
        detection: "Uptime above 72 hours with throughput down by more than 30%",
    },
    Seed {
        id: "LEAK_001",
        symptoms: "Usage climbs steadily and recovers after a restart",
        pattern: || SymptomPattern::shape(TrajectoryShape::SteadyIncrease),
        root_cause: "The subtitle parser does not release its resources",
        solution: "Fix resource management in the subtitle parser",
        severity: Severity::Medium,
        impact: &["Frequent restarts are needed", "Long videos fail to process"],
        detection: "About 5MB is retained for every 100 subtitles parsed",
    },
    Seed {
        id: "LEAK_002",
        symptoms: "GPU memory grows slowly until it is exhausted",
        pattern: || SymptomPattern::shape(TrajectoryShape::SteadyIncrease).context("device", "gpu"),
        root_cause: "The CUDA tensor cache is not released",
        solution: "Clear the CUDA cache explicitly after every inference",
        severity: Severity::High,
        impact: &["GPU acceleration is lost", "Processing falls back to the slower CPU path"],
        detection: "GPU memory usage keeps growing and is never released",
    },
    Seed {
        id: "CONT_001",
        symptoms: "Usage swings up and down while jobs run in parallel",
        pattern: || {
            SymptomPattern::shape(TrajectoryShape::Fluctuation)
                .rise(25.0)
                .context("task_type", "parallel")
        },
        root_cause: "Concurrent jobs contend for memory",
        solution: "Schedule jobs and allocate resources with memory budgets in mind",
        severity: Severity::Medium,
        impact: &["Throughput drops", "Completion times become unpredictable"],
        detection: "Usage swings by more than 25 points while CPU usage is above 90%",
    },
    Seed {
        id: "CONF_001",
        symptoms: "Memory usage is high right after startup",
        pattern: || {
            SymptomPattern::shape(TrajectoryShape::ImmediateHigh)
                .peak(60.0)
                .context("phase", "startup")
        },
        root_cause: "The initial video buffer is configured too large",
        solution: "Lower max_buffer_size in the configuration",
        severity: Severity::Medium,
        impact: &["Several videos cannot be processed at once", "Startup is slow"],
        detection: "Usage exceeds 60% within five minutes of startup",
    },
    Seed {
        id: "CONF_002",
        symptoms: "Memory runs out only for specific kinds of video",
        pattern: || {
            SymptomPattern::shape(TrajectoryShape::SpecificTrigger)
                .peak(85.0)
                .context("resolution", "4k")
        },
        root_cause: "The buffering strategy does not suit high-resolution input",
        solution: "Use adaptive buffering for high-resolution videos",
        severity: Severity::Medium,
        impact: &["High-definition videos fail to process"],
        detection: "Usage exceeds 85% while processing inputs above 4K",
    },
];

/// The cases every engine starts with.
pub fn builtin_cases() -> Vec<Case> {
    SEEDS
        .iter()
        .map(|seed| Case {
            case_id: seed.id.to_string(),
            symptoms: seed.symptoms.to_string(),
            pattern: (seed.pattern)(),
            root_cause: seed.root_cause.to_string(),
            solution: seed.solution.to_string(),
            severity: seed.severity,
            impact: seed.impact.iter().map(|line| line.to_string()).collect(),
            detection: Some(seed.detection.to_string()),
            source: Some("builtin".to_string()),
            added_at: None,
        })
        .collect()
}
