//! Process-wide Prometheus counters/histograms for the broker (§4.9/C10).

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramOpts,
    HistogramVec, IntCounter, IntCounterVec, Opts, DEFAULT_BUCKETS,
};

const NAMESPACE: &str = "lead_broker";
const SUBSYSTEM_AUCTION: &str = "auction";
const SUBSYSTEM_BUYER: &str = "buyer";

const REASON_LABEL: &str = "reason";
const BUYER_LABEL: &str = "buyer";
const ACTION_LABEL: &str = "action";

lazy_static! {
    pub static ref AUCTIONS_SOLD: IntCounter = register_int_counter!(
        Opts::new("sold_total", "total number of leads sold")
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM_AUCTION)
    )
    .unwrap();
    pub static ref AUCTIONS_FAILED: IntCounter = register_int_counter!(
        Opts::new("failed_total", "total number of auctions that ended FAILED")
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM_AUCTION)
    )
    .unwrap();
    pub static ref AUCTIONS_REJECTED: IntCounterVec = register_int_counter_vec!(
        Opts::new("rejected_total", "total number of auctions that ended REJECTED, by reason")
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM_AUCTION),
        &[REASON_LABEL]
    )
    .unwrap();
    pub static ref BUYER_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        HistogramOpts {
            common_opts: Opts::new(
                "call_duration_seconds",
                "duration of outbound buyer PING/POST calls"
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM_BUYER),
            buckets: DEFAULT_BUCKETS.to_vec(),
        },
        &[BUYER_LABEL, ACTION_LABEL]
    )
    .unwrap();
    pub static ref BUYER_CALL_TIMEOUTS: IntCounterVec = register_int_counter_vec!(
        Opts::new("call_timeouts_total", "total number of buyer calls that timed out")
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM_BUYER),
        &[BUYER_LABEL, ACTION_LABEL]
    )
    .unwrap();
    pub static ref WEBHOOKS_RECEIVED: IntCounterVec = register_int_counter_vec!(
        Opts::new("webhooks_received_total", "total number of accepted webhook deliveries")
            .namespace(NAMESPACE)
            .subsystem("webhook"),
        &[BUYER_LABEL, ACTION_LABEL]
    )
    .unwrap();
    pub static ref WEBHOOKS_REJECTED: IntCounter = register_int_counter!(
        Opts::new("webhooks_rejected_total", "total number of webhook deliveries rejected (bad signature or payload)")
            .namespace(NAMESPACE)
            .subsystem("webhook")
    )
    .unwrap();
}
