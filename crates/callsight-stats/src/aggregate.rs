//! Reduction of collected series into scalar aggregates.
//!
//! Runs once per connection after the log is exhausted. Counters that only
//! grow (packets lost/sent) reduce to their last value, not a sum; sampled
//! values reduce to means, variances, or order statistics.

use callsight_core::series::{fixed_dec_mean, mean, median, percent_of, round_to, standardized_moment};

use crate::collector::CollectedStats;

/// Packet totals and loss rate for one media kind.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MediaPacketAggregates {
    /// Total packets lost (last counter value, summed across tracks).
    pub packets_lost: f64,
    /// Total packets sent (last counter value, summed across tracks).
    pub packets_sent: f64,
    /// Lost as a percentage of sent; `None` when nothing was sent.
    pub packets_lost_pct: Option<f64>,
}

/// Share of time spent in each video definition bucket, as percentages.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResolutionTimeShare {
    /// No video sent.
    pub no_video_pct: Option<f64>,
    /// Low definition (below 360 lines).
    pub ld_pct: Option<f64>,
    /// Standard definition (360 to 719 lines).
    pub sd_pct: Option<f64>,
    /// High definition (720 lines and up).
    pub hd_pct: Option<f64>,
}

/// Order statistics of the used send resolutions.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResolutionAggregates {
    /// Smallest non-zero resolution used.
    pub min: f64,
    /// Median of the distinct resolutions used.
    pub median: f64,
    /// Largest resolution used.
    pub max: f64,
}

/// Scalar aggregates for one connection.
#[derive(Clone, Debug, Default)]
pub struct QualityAggregates {
    /// Mean round-trip time in seconds, two decimals.
    pub mean_rtt: f64,
    /// Round-trip time variance.
    pub rtt_variance: f64,
    /// Mean send bitrate in bits per millisecond (floored).
    pub mean_sending_bitrate: f64,
    /// Mean receive bitrate in bits per millisecond (floored).
    pub mean_receiving_bitrate: f64,
    /// Audio packet aggregates, when any audio track reported.
    pub audio: Option<MediaPacketAggregates>,
    /// Video packet aggregates, when any video track reported.
    pub video: Option<MediaPacketAggregates>,
    /// Definition time-share buckets.
    pub time_share: ResolutionTimeShare,
    /// Resolution order statistics.
    pub resolution: ResolutionAggregates,
    /// Share of screen-share samples limited by CPU, when screen-sharing.
    pub cpu_limited_pct: Option<f64>,
    /// Share of screen-share samples limited by bandwidth.
    pub bandwidth_limited_pct: Option<f64>,
    /// Whether the selected path ran through a relay server.
    pub uses_relay: Option<bool>,
}

/// Reduces [`CollectedStats`] once the log is exhausted.
pub struct StatsAggregator;

impl StatsAggregator {
    /// Compute every aggregate for one connection's collected data.
    #[must_use]
    pub fn calculate(data: &CollectedStats) -> QualityAggregates {
        let (audio, video) = Self::packet_aggregates(data);
        let (time_share, resolution) = Self::resolution_aggregates(&data.used_resolutions);
        let (cpu_limited_pct, bandwidth_limited_pct) = Self::screen_share_rates(data);

        QualityAggregates {
            mean_rtt: fixed_dec_mean(&data.rtts, 2),
            rtt_variance: round_to(standardized_moment(&data.rtts, 2), 4),
            mean_sending_bitrate: mean(&data.send_bitrates).floor(),
            mean_receiving_bitrate: mean(&data.recv_bitrates).floor(),
            audio,
            video,
            time_share,
            resolution,
            cpu_limited_pct,
            bandwidth_limited_pct,
            uses_relay: data.uses_relay,
        }
    }

    /// Counters are cumulative, so the last value of each series is the
    /// track's total; tracks of the same media kind sum together.
    fn packet_aggregates(
        data: &CollectedStats,
    ) -> (Option<MediaPacketAggregates>, Option<MediaPacketAggregates>) {
        let mut audio: Option<MediaPacketAggregates> = None;
        let mut video: Option<MediaPacketAggregates> = None;

        for track in data.tracks.values() {
            let (Some(&lost), Some(&sent)) =
                (track.packets_sent_lost.last(), track.packets_sent.last())
            else {
                continue;
            };
            let slot = match track.media_type.as_str() {
                "audio" => &mut audio,
                "video" => &mut video,
                _ => continue,
            };
            let aggregate = slot.get_or_insert_with(MediaPacketAggregates::default);
            aggregate.packets_lost += lost;
            aggregate.packets_sent += sent;
        }

        for slot in [&mut audio, &mut video] {
            if let Some(aggregate) = slot {
                aggregate.packets_lost_pct =
                    percent_of(aggregate.packets_lost, aggregate.packets_sent);
            }
        }

        (audio, video)
    }

    /// Bucket every resolution sample and compute order statistics over the
    /// distinct non-zero resolutions used.
    fn resolution_aggregates(samples: &[f64]) -> (ResolutionTimeShare, ResolutionAggregates) {
        let mut no_video = 0.0;
        let mut ld = 0.0;
        let mut sd = 0.0;
        let mut hd = 0.0;
        let mut distinct: Vec<f64> = Vec::new();

        for &resolution in samples {
            if resolution >= 720.0 {
                hd += 1.0;
            } else if resolution >= 360.0 {
                sd += 1.0;
            } else if resolution > 0.0 {
                ld += 1.0;
            } else {
                no_video += 1.0;
            }
            if resolution > 0.0 && !distinct.contains(&resolution) {
                distinct.push(resolution);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let total = samples.len() as f64;
        let time_share = ResolutionTimeShare {
            no_video_pct: percent_of(no_video, total),
            ld_pct: percent_of(ld, total),
            sd_pct: percent_of(sd, total),
            hd_pct: percent_of(hd, total),
        };

        distinct.sort_by(f64::total_cmp);
        let resolution = ResolutionAggregates {
            min: distinct.first().copied().unwrap_or(0.0),
            median: median(&distinct).unwrap_or(0.0),
            max: distinct.last().copied().unwrap_or(0.0),
        };

        (time_share, resolution)
    }

    fn screen_share_rates(data: &CollectedStats) -> (Option<f64>, Option<f64>) {
        if data.screen_share.is_empty() {
            return (None, None);
        }
        #[allow(clippy::cast_precision_loss)]
        let total = data.screen_share.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let cpu = data.screen_share.iter().filter(|s| s.cpu_limited).count() as f64;
        #[allow(clippy::cast_precision_loss)]
        let bandwidth = data
            .screen_share
            .iter()
            .filter(|s| s.bandwidth_limited)
            .count() as f64;
        (percent_of(cpu, total), percent_of(bandwidth, total))
    }
}
