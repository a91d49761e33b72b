//! Human-readable output.

use crate::PressureReport;
use ward_kb::{Case, Diagnosis, DiagnosisMiss, KnowledgeStats};

pub(crate) fn stats(stats: &KnowledgeStats) {
    println!("knowledge base:");
    println!("  total_cases: {}", stats.total_cases);
    for (case_type, count) in &stats.case_types {
        println!("    {case_type}: {count}");
    }
    println!("  diagnosis_count: {}", stats.diagnosis_count);
    if !stats.top_matched.is_empty() {
        println!("  most matched:");
        for entry in &stats.top_matched {
            println!("    {}: {}", entry.case_id, entry.count);
        }
    }
    if let Some(last_update) = &stats.last_update {
        println!("  last_update: {last_update}");
    }
}

pub(crate) fn diagnosis(diagnosis: &Diagnosis) {
    println!("diagnosis {}", diagnosis.diagnosis_id);
    println!("  matched case: {}", diagnosis.matched_case_id);
    println!("  confidence: {:.2}", diagnosis.confidence);
    println!("  trajectory: {}", diagnosis.shape);
    println!("  severity: {}", diagnosis.severity);
    println!("  root cause: {}", diagnosis.root_cause);
    println!("  solution: {}", diagnosis.solution);
    for line in &diagnosis.impact {
        println!("  impact: {line}");
    }
    if !diagnosis.similar_case_ids.is_empty() {
        println!("  similar cases: {}", diagnosis.similar_case_ids.join(", "));
    }
}

pub(crate) fn miss(miss: &DiagnosisMiss) {
    println!("no confident match: {miss}");
    let advice = &miss.advice;
    println!("generic advice (confidence {:.2}):", advice.confidence);
    println!("  possible cause: {}", advice.root_cause);
    println!("  suggestion: {}", advice.solution);
    match advice.severity {
        Some(severity) => println!("  severity: {severity}"),
        None => println!("  severity: unknown"),
    }
    for line in &advice.impact {
        println!("  impact: {line}");
    }
}

pub(crate) fn case(case: &Case) {
    println!("case {}", case.case_id);
    if !case.symptoms.is_empty() {
        println!("  symptoms: {}", case.symptoms);
    }
    println!("  pattern: {}", case.pattern.shape);
    if let Some(peak) = case.pattern.peak_at_least {
        println!("    peak >= {peak}%");
    }
    if let Some(rise) = case.pattern.rise_at_least {
        println!("    rise >= {rise} points");
    }
    for (key, value) in &case.pattern.context {
        println!("    {key} = {value}");
    }
    println!("  root cause: {}", case.root_cause);
    println!("  solution: {}", case.solution);
    println!("  severity: {}", case.severity);
    for line in &case.impact {
        println!("  impact: {line}");
    }
    if let Some(detection) = &case.detection {
        println!("  detection: {detection}");
    }
    if let Some(source) = &case.source {
        println!("  source: {source}");
    }
}

pub(crate) fn case_list(cases: &[Case], case_type: Option<&str>) {
    if cases.is_empty() {
        match case_type {
            Some(case_type) => println!("no cases of type {case_type}"),
            None => println!("no cases"),
        }
        return;
    }
    for case in cases {
        println!("{}  [{}]  {}", case.case_id, case.severity, case.root_cause);
    }
}

pub(crate) fn history(recent: &[Diagnosis]) {
    if recent.is_empty() {
        println!("no diagnoses yet");
        return;
    }
    for diagnosis in recent {
        println!(
            "{}  {}  {} ({:.2})",
            diagnosis.timestamp, diagnosis.diagnosis_id, diagnosis.matched_case_id, diagnosis.confidence
        );
    }
}

pub(crate) fn pressure(report: &PressureReport) {
    println!("memory pressure: {}", report.level);
    println!("  percent_used: {:.1}", report.percent_used);
    println!("  process_mb: {:.1}", report.process_mb);
    println!("  trend: {}", report.stats.trend);
    if report.plan.is_empty() {
        println!("  mitigation plan: none");
    } else {
        println!("  mitigation plan:");
        for (idx, step) in report.plan.iter().enumerate() {
            println!("    {}. {} ({}, {:.1})", idx + 1, step.action, step.band, step.weight);
        }
    }
}
