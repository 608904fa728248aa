use crate::SearchConfig;
use crate::error::Result;
use crate::feed::{SequenceFeed, TargetSequence};
use crate::hits::{HitReporter, HitSink};
use crate::scheduler::{LaneResult, LaneScheduler};
use crate::substitution::{SubstitutionTable, encode_symbols};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Targets pulled from the feed
    pub targets: usize,
    /// Hits handed to the sink
    pub hits: usize,
    pub dispatches: usize,
    pub steps: usize,
    /// Targets dropped mid-sequence when the feed ran dry
    pub discarded: usize,
}

impl std::ops::AddAssign for SearchStats {
    fn add_assign(&mut self, other: Self) {
        self.targets += other.targets;
        self.hits += other.hits;
        self.dispatches += other.dispatches;
        self.steps += other.steps;
        self.discarded += other.discarded;
    }
}

/// Scores queries against a database feed, streaming hits above the threshold into a sink
#[derive(Debug, Clone)]
pub struct Searcher {
    config: SearchConfig,
    table: SubstitutionTable,
}

impl Searcher {
    /// Validates the config and resolves its scoring matrix
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let table = SubstitutionTable::named(&config.matrix, &config.alphabet)?;
        Ok(Self { config, table })
    }

    /// Use an already built table, ignoring `config.matrix`
    pub fn with_table(config: SearchConfig, table: SubstitutionTable) -> Result<Self> {
        config.validate_without_matrix()?;
        Ok(Self { config, table })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn table(&self) -> &SubstitutionTable {
        &self.table
    }

    /// Score one query, given as residue letters, against every target in `feed`
    pub fn search<F: SequenceFeed, S: HitSink>(
        &self,
        query_id: u32,
        query: &[u8],
        feed: F,
        sink: S,
    ) -> Result<SearchStats> {
        let codes = encode_symbols(&query_id.to_string(), query)?;
        self.search_codes(query_id, &codes, feed, sink)
    }

    /// Score every query in turn, opening a fresh feed for each since feeds are never rewound
    pub fn search_many<F, S>(
        &self,
        queries: impl IntoIterator<Item = TargetSequence>,
        mut open_feed: impl FnMut() -> Result<F>,
        mut sink: S,
    ) -> Result<SearchStats>
    where
        F: SequenceFeed,
        S: HitSink,
    {
        let mut total = SearchStats::default();
        let mut queries_run = 0;
        for query in queries {
            let feed = open_feed()?;
            total += self.search_codes(query.id, query.residues(), feed, &mut sink)?;
            queries_run += 1;
        }

        log::info!(
            "Searched {} queries: {} targets scored, {} hits",
            queries_run,
            total.targets,
            total.hits
        );
        Ok(total)
    }

    fn search_codes<F: SequenceFeed, S: HitSink>(
        &self,
        query_id: u32,
        codes: &[u8],
        feed: F,
        mut sink: S,
    ) -> Result<SearchStats> {
        let expansion = self.table.expand(codes);
        let mut scheduler = LaneScheduler::new(&expansion, feed, &self.config);
        let mut reporter = HitReporter::new(query_id, &self.config);

        log::debug!(
            "Query {}: {} residues across {} lanes",
            query_id,
            codes.len(),
            scheduler.lane_count()
        );

        let mut finished: Vec<LaneResult> = vec![];
        while scheduler.dispatch(&mut |result| finished.push(result)) > 0 {
            for result in finished.drain(..) {
                if let Some(hit) = reporter.report(&result) {
                    sink.push_hit(hit)?;
                }
            }
        }

        let scheduled = scheduler.stats();
        let stats = SearchStats {
            targets: scheduled.targets,
            hits: reporter.emitted(),
            dispatches: scheduled.dispatches,
            steps: scheduled.steps,
            discarded: scheduled.discarded,
        };
        log::info!(
            "Query {}: {} targets, {} hits, {} dispatches",
            query_id,
            stats.targets,
            stats.hits,
            stats.dispatches
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::feed::feed_from_residues;
    use crate::hits::{HitRecord, LinkReader, LinkWriter};
    use crate::scheduler::TailPolicy;

    fn ac_searcher() -> Searcher {
        let table =
            SubstitutionTable::from_pairs(-5, &[(b'A', b'A', 5), (b'C', b'C', 5), (b'A', b'C', -5)]);
        Searcher::with_table(SearchConfig::default(), table).unwrap()
    }

    #[test]
    fn test_custom_table_still_checks_penalties() {
        let table = SubstitutionTable::from_pairs(-1, &[]);
        let config = SearchConfig {
            gap_penalty: 50,
            boundary_penalty: 40,
            ..SearchConfig::default()
        };
        let err = Searcher::with_table(config, table.clone()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let config = SearchConfig {
            gap_penalty: -1,
            ..SearchConfig::default()
        };
        assert!(Searcher::with_table(config, table).is_err());
    }

    #[test]
    fn test_saturated_target_does_not_inflate_next() {
        let table = SubstitutionTable::from_pairs(-3, &[(b'W', b'W', 100)]);
        let searcher = Searcher::with_table(
            SearchConfig {
                lanes: 16,
                ..SearchConfig::default()
            },
            table,
        )
        .unwrap();
        let long = "W".repeat(400);
        let mut targets = (0..16).map(|id| (id, long.as_str())).collect::<Vec<_>>();
        targets.push((100, "A"));

        let mut hits = vec![];
        searcher
            .search(999, long.as_bytes(), feed_from_residues(targets).unwrap(), &mut hits)
            .unwrap();

        assert_eq!(hits.len(), 16);
        assert!(hits.iter().all(|h| h.score == i16::MAX as i32));
        assert!(hits.iter().all(|h| h.target_id != 100));
    }

    #[test]
    fn test_two_matches_no_gaps() {
        let feed = feed_from_residues([(1, "AC")]).unwrap();
        let mut hits = vec![];
        let stats = ac_searcher().search(0, b"AC", feed, &mut hits).unwrap();

        assert_eq!(
            hits,
            vec![HitRecord {
                query_id: 0,
                target_id: 1,
                score: 10,
                location: 2,
                length: 2,
            }]
        );
        assert_eq!(stats.targets, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_threshold_and_self_hits() {
        let searcher = Searcher::new(SearchConfig {
            reporting_threshold: 15,
            ..SearchConfig::default()
        })
        .unwrap();
        // W=11, so "W" alone stays under the threshold
        let feed = feed_from_residues([(0, "WW"), (1, "W"), (2, "AWWA"), (3, "")]).unwrap();

        let mut hits = vec![];
        let stats = searcher.search(0, b"WW", feed, &mut hits).unwrap();
        let targets = hits.iter().map(|h| h.target_id).collect::<Vec<_>>();

        assert_eq!(targets, vec![2]);
        assert_eq!(hits[0].score, 22);
        assert_eq!(hits[0].location, 3);
        assert_eq!(stats.targets, 4);
    }

    #[test]
    fn test_empty_query_reports_nothing() {
        let searcher = Searcher::new(SearchConfig::default()).unwrap();
        let feed = feed_from_residues([(1, "MKV"), (2, "WWW")]).unwrap();
        let mut hits = vec![];
        let stats = searcher.search(0, b"", feed, &mut hits).unwrap();
        assert!(hits.is_empty());
        assert_eq!(stats.targets, 2);
    }

    #[test]
    fn test_malformed_query_fails_before_dispatch() {
        let searcher = Searcher::new(SearchConfig::default()).unwrap();
        let feed = feed_from_residues([(1, "MKV")]).unwrap();
        let err = searcher.search(0, b"MK1V", feed, vec![]).unwrap_err();
        assert!(matches!(err, Error::MalformedSequence { .. }));
    }

    #[test]
    fn test_search_many_opens_fresh_feeds() {
        let searcher = Searcher::new(SearchConfig::default()).unwrap();
        let database = [(0, "MKWVTFISLL"), (1, "MKWVTFISLA"), (2, "GGGGGG")];
        let queries = feed_from_residues(database).unwrap();

        let mut opened = 0;
        let mut hits = vec![];
        let stats = searcher
            .search_many(
                queries,
                || {
                    opened += 1;
                    feed_from_residues(database)
                },
                &mut hits,
            )
            .unwrap();

        assert_eq!(opened, 3);
        assert_eq!(stats.targets, 9);
        assert_eq!(stats.hits, hits.len());
        assert!(hits.iter().all(|h| h.query_id != h.target_id));
        assert!(
            hits.iter()
                .any(|h| (h.query_id, h.target_id) == (0, 1))
        );
        assert!(
            hits.iter()
                .any(|h| (h.query_id, h.target_id) == (1, 0))
        );
    }

    #[test]
    fn test_hits_stream_to_link_writer() {
        let searcher = ac_searcher();
        let feed = feed_from_residues([(1, "AC"), (2, "CA"), (3, "GG")]).unwrap();

        let mut writer = LinkWriter::new(vec![]);
        searcher.search(9, b"AC", feed, &mut writer).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.written(), 2);
    }

    #[test]
    fn test_links_read_back_from_file() {
        let searcher = ac_searcher();
        let feed = feed_from_residues([(1, "AC"), (2, "CCAC")]).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();

        let mut writer = LinkWriter::new(file.reopen().unwrap());
        searcher.search(0, b"AC", feed, &mut writer).unwrap();
        writer.flush().unwrap();

        let links = LinkReader::new(file.reopen().unwrap())
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.score == 10));
        assert_eq!(links[1].location, 4);
    }

    #[test]
    fn test_discard_stats_propagate() {
        let searcher = Searcher::new(SearchConfig {
            lanes: 16,
            steps_per_dispatch: 2,
            tail_policy: TailPolicy::Discard,
            ..SearchConfig::default()
        })
        .unwrap();
        let records = (0..20).map(|id| (id, "W".repeat(1 + id as usize % 5)));
        let feed = feed_from_residues(records).unwrap();

        let stats = searcher.search(100, b"WW", feed, vec![]).unwrap();
        assert_eq!(stats.targets, 20);
        assert!(stats.discarded > 0);
    }
}
