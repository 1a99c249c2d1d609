//! Human-readable summaries of excavations and plans.

use crate::excavator::Excavation;
use crate::knot::KnotKind;
use crate::pipeline::Plan;

const BANNER: &str = "═══════════════════════════════════════════════════════════════════════\n";

/// Summarize an excavation.
pub fn format_excavation(excavation: &Excavation) -> String {
    let mut output = String::new();

    output.push_str(BANNER);
    output.push_str("  Knot Excavation\n");
    output.push_str(BANNER);
    output.push('\n');

    let count = |kind: KnotKind| excavation.knots.iter().filter(|k| k.kind() == kind).count();
    output.push_str(&format!(
        "Communications:         {}\n",
        excavation.communications.len()
    ));
    output.push_str(&format!("Knots:                  {}\n", excavation.knots.len()));
    output.push_str(&format!(
        "  parallel:             {}\n",
        count(KnotKind::Parallel)
    ));
    output.push_str(&format!(
        "  overlapped:           {}\n",
        count(KnotKind::Overlapped)
    ));
    output.push('\n');

    for (i, knot) in excavation.knots.iter().enumerate() {
        output.push_str(&format!("[{}] {}\n", i, knot));
    }
    output
}

/// Summarize a plan.
pub fn format_plan(plan: &Plan) -> String {
    let mut output = String::new();

    output.push_str(BANNER);
    output.push_str("  Interleaving Plan\n");
    output.push_str(BANNER);
    output.push('\n');

    output.push_str(&format!("Novel knots:            {}\n", plan.novel));
    output.push_str(&format!("Orchestrator rounds:    {}\n", plan.rounds));
    output.push_str(&format!("Scheduled knots:        {}\n", plan.round.len()));
    output.push('\n');

    output.push_str("─── Schedule Points ───────────────────────────────────────────────────\n");
    for point in &plan.sched_points {
        output.push_str(&format!("  {}\n", point));
    }
    output.push('\n');

    output.push_str("─── Candidate ─────────────────────────────────────────────────────────\n");
    output.push_str(&plan.candidate.to_string());
    for point in &plan.candidate_points {
        output.push_str(&format!("  stall {}\n", point));
    }
    output.push('\n');

    output.push_str("─── Flush Vector ──────────────────────────────────────────────────────\n");
    output.push_str(&format!("  {}\n", plan.flush_vector));
    output
}
