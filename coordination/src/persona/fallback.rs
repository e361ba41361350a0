//! Deterministic fallback positions, keyed by domain and role.
//!
//! Used whenever generation fails, times out, or returns nothing usable, so
//! every round completes with the same protocol shape.

use crate::debate::{DebateContent, PersonaRole};

/// One canned position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackEntry {
    pub position: &'static str,
    pub reasoning: &'static str,
    pub evidence: &'static [&'static str],
    pub confidence: u8,
    pub actions: &'static [&'static str],
}

impl FallbackEntry {
    pub fn to_content(&self) -> DebateContent {
        DebateContent {
            position: self.position.to_string(),
            reasoning: self.reasoning.to_string(),
            evidence: self
                .evidence
                .iter()
                .map(|e| serde_json::Value::String((*e).to_string()))
                .collect(),
            confidence: self.confidence,
            suggested_actions: self.actions.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

/// Domains with dedicated entries. Anything else uses `general`.
pub const FALLBACK_DOMAINS: [&str; 5] = ["bom", "inventory", "profitability", "cost", "general"];

/// Fallback entry for a (domain, role) pair.
pub fn fallback_entry(domain: &str, role: PersonaRole) -> &'static FallbackEntry {
    let row = match domain.to_ascii_lowercase().as_str() {
        "bom" => &BOM,
        "inventory" => &INVENTORY,
        "profitability" => &PROFITABILITY,
        "cost" => &COST,
        _ => &GENERAL,
    };
    match role {
        PersonaRole::Optimist => &row[0],
        PersonaRole::Pessimist => &row[1],
        PersonaRole::Mediator => &row[2],
    }
}

static BOM: [FallbackEntry; 3] = [
    FallbackEntry {
        position: "Tightening BOM standards can recover most of the observed material variance within two quarters",
        reasoning: "Variance is concentrated in a small number of components, so correcting their standard quantities and scrap allowances addresses the bulk of the gap.",
        evidence: &[
            "Variance clusters on a few high-usage components",
            "Scrap allowances were last revised more than a year ago",
        ],
        confidence: 72,
        actions: &[],
    },
    FallbackEntry {
        position: "Part of the variance reflects process yield losses that standard changes alone will not fix",
        reasoning: "Adjusting BOM quantities to match actual consumption can hide genuine waste on the line and normalise losses instead of removing them.",
        evidence: &[
            "Yield differs between shifts on the same routing",
            "Rework is booked against the same material accounts",
        ],
        confidence: 58,
        actions: &[],
    },
    FallbackEntry {
        position: "Correct the clearly outdated standards while separately measuring yield loss on the worst lines",
        reasoning: "Both views hold: stale standards inflate the variance, and some of the remainder is process waste. Splitting the two lets each be fixed by its owner.",
        evidence: &[
            "Component-level variance ranking",
            "Shift-level yield comparison",
        ],
        confidence: 64,
        actions: &[
            "Update standard quantities for the top 10 variance components this month",
            "Track scrap per shift on the 2 worst lines for 6 weeks",
            "Review the variance trend after 2 closing cycles",
        ],
    },
];

static INVENTORY: [FallbackEntry; 3] = [
    FallbackEntry {
        position: "Reducing safety stock on slow movers can free working capital without hurting service levels",
        reasoning: "Slow-moving items carry cover far beyond their demand variability, so trimming that cover releases cash with little stock-out exposure.",
        evidence: &[
            "Slow movers hold a large share of stock value",
            "Stock-outs concentrate on fast movers",
        ],
        confidence: 70,
        actions: &[],
    },
    FallbackEntry {
        position: "Supplier lead-time variability makes lower safety stock a stock-out risk for key items",
        reasoning: "Several slow movers are single-sourced with irregular deliveries, so cutting cover exposes production to supply shocks that demand data does not show.",
        evidence: &[
            "Lead times vary widely for single-source parts",
            "Late deliveries recur for the same suppliers",
        ],
        confidence: 60,
        actions: &[],
    },
    FallbackEntry {
        position: "Cut cover on slow movers with reliable supply and hold it on single-sourced items",
        reasoning: "Segmenting by supply risk keeps the working-capital gain where it is cheap and protects the items where lead time, not demand, drives risk.",
        evidence: &[
            "Stock value by movement class",
            "Lead-time variance by supplier",
        ],
        confidence: 64,
        actions: &[
            "Lower safety stock by 20% for slow movers with 2 or more suppliers",
            "Keep current cover for single-sourced parts until lead times stabilise",
            "Recalculate reorder points every 4 weeks",
        ],
    },
];

static PROFITABILITY: [FallbackEntry; 3] = [
    FallbackEntry {
        position: "Targeted price increases on low-margin products can restore overall margin",
        reasoning: "Low-margin products are priced below peers and their customers show limited price sensitivity in past increases.",
        evidence: &[
            "Low-margin lines price below comparable products",
            "Earlier increases caused little volume loss",
        ],
        confidence: 71,
        actions: &[],
    },
    FallbackEntry {
        position: "Raising prices risks volume on products that carry shared fixed costs",
        reasoning: "Some low-margin products absorb overhead for the whole plant; losing their volume would shift that cost onto other lines and lower total profit.",
        evidence: &[
            "Fixed cost allocation depends on volume",
            "Key accounts buy low- and high-margin lines together",
        ],
        confidence: 57,
        actions: &[],
    },
    FallbackEntry {
        position: "Reprice selectively where demand is stable and protect volume on bundled accounts",
        reasoning: "The margin gain is real on stand-alone products, while bundled accounts need price held to keep the overhead base covered.",
        evidence: &[
            "Margin by product and account",
            "Volume response to past price changes",
        ],
        confidence: 63,
        actions: &[
            "Raise prices 3-5% on the 5 lowest-margin stand-alone products",
            "Hold prices for the top 10 bundled accounts this quarter",
            "Compare margin and volume 8 weeks after the change",
        ],
    },
];

static COST: [FallbackEntry; 3] = [
    FallbackEntry {
        position: "Consolidating suppliers can cut purchase cost through volume discounts",
        reasoning: "Spend is spread across many suppliers for the same categories, which leaves volume discounts unused.",
        evidence: &[
            "Several suppliers per category with similar specs",
            "Quoted discounts start at higher annual volumes",
        ],
        confidence: 73,
        actions: &[],
    },
    FallbackEntry {
        position: "Fewer suppliers increases dependency and weakens negotiating position over time",
        reasoning: "Concentrating spend trades a one-off discount for exposure to a single supplier's capacity, quality and pricing decisions.",
        evidence: &[
            "Past disruptions hit single-source categories hardest",
            "Switching costs rise once tooling is dedicated",
        ],
        confidence: 59,
        actions: &[],
    },
    FallbackEntry {
        position: "Consolidate commodity categories but keep a second source for critical parts",
        reasoning: "Commodity spend gains most from volume with little dependency risk, while critical parts justify the cost of a second qualified supplier.",
        evidence: &[
            "Spend by category and criticality",
            "Disruption history by supplier",
        ],
        confidence: 65,
        actions: &[
            "Tender the 3 largest commodity categories to at most 2 suppliers each",
            "Qualify a second source for every critical part with one supplier",
            "Report realised savings against the baseline after 1 quarter",
        ],
    },
];

static GENERAL: [FallbackEntry; 3] = [
    FallbackEntry {
        position: "The proposed change is likely to deliver a net benefit",
        reasoning: "The available context points to an improvement that outweighs its direct cost.",
        evidence: &["Context indicates a favourable trend"],
        confidence: 65,
        actions: &[],
    },
    FallbackEntry {
        position: "The benefit depends on assumptions the current data does not confirm",
        reasoning: "Costs and risks outside the supplied context could offset the expected gain.",
        evidence: &["Limited history in the supplied data"],
        confidence: 55,
        actions: &[],
    },
    FallbackEntry {
        position: "Proceed with a limited pilot and decide on wider rollout from its results",
        reasoning: "A pilot captures the expected benefit at small scale while testing the assumptions raised against it.",
        evidence: &["Balance of the two prior positions"],
        confidence: 60,
        actions: &[
            "Run a 6 week pilot in 1 area with a defined success metric",
            "Decide on rollout at the end of the pilot using the measured results",
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_domain_has_three_roles() {
        for domain in FALLBACK_DOMAINS {
            for role in PersonaRole::all() {
                let entry = fallback_entry(domain, role);
                assert!(!entry.position.is_empty());
                assert!(!entry.evidence.is_empty());
                assert!(entry.confidence <= 100);
            }
        }
    }

    #[test]
    fn test_unknown_domain_uses_general() {
        assert_eq!(
            fallback_entry("logistics", PersonaRole::Mediator),
            fallback_entry("general", PersonaRole::Mediator)
        );
        assert_eq!(
            fallback_entry("BOM", PersonaRole::Optimist),
            fallback_entry("bom", PersonaRole::Optimist)
        );
    }

    #[test]
    fn test_mediator_entries_are_balanced_and_actionable() {
        for domain in FALLBACK_DOMAINS {
            let thesis = fallback_entry(domain, PersonaRole::Optimist).confidence;
            let anti = fallback_entry(domain, PersonaRole::Pessimist).confidence;
            let mediator = fallback_entry(domain, PersonaRole::Mediator);
            assert!(!mediator.actions.is_empty());
            assert!(mediator.confidence >= thesis.min(anti));
            assert!(mediator.confidence <= thesis.max(anti));
        }
    }
}
