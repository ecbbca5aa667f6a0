//! Property tests over generated compaction chains.

use handoff_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chain_settles_once_newest_is_served(chain in compaction_chain_strategy(12)) {
        let cluster = ClusterFixture::new();
        let observer = cluster.observer();
        observer.register(COLLECTION_ID);
        for event in &chain {
            cluster.produce(event);
        }
        observer.start_handoff(COLLECTION_ID).unwrap();

        let newest = chain.last().map(|event| event.segment_id).unwrap();
        let older: Vec<_> = chain[..chain.len() - 1].iter().map(|e| e.segment_id).collect();

        // Serving every older generation settles nothing.
        let mut served = vec![1, 2];
        served.extend(&older);
        cluster.serve(&served);
        prop_assert!(observer.tick().is_idle());
        prop_assert_eq!(observer.pending_count(), chain.len());

        cluster.serve(&[1, 2, newest]);
        let report = observer.tick();
        prop_assert_eq!(report.accepted, vec![newest]);
        prop_assert_eq!(report.retired, older);
        prop_assert_eq!(cluster.targeted(), vec![1, 2, newest]);
        for event in &chain {
            prop_assert!(!cluster.key_exists(event.segment_id));
        }

        // Settled: another tick changes nothing.
        prop_assert!(observer.tick().is_idle());
        prop_assert_eq!(cluster.targeted(), vec![1, 2, newest]);
    }
}
