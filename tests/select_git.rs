mod support;

use chrono::{FixedOffset, NaiveDate};
use git2::Oid;
use revsel::graph::git::GitGraph;
use revsel::history::{BuildHistory, BuildResult};
use revsel::revision::{CommitId, Revision};
use revsel::select::{
    QueueStrategy, SelectCandidates, SelectionContext, Strategy, StrategyKind, StrategyOptions,
};

use support::{commit_id, TestRepo, DAY, TODAY_MIDNIGHT};

struct Linear {
    repo: TestRepo,
    commits: Vec<Oid>,
}

/// root -> a -> b -> c, with origin/one at a, origin/two at b, origin/three at c.
fn linear() -> Result<Linear, git2::Error> {
    let repo = TestRepo::init()?;
    let root = repo.commit_at("root", &[], TODAY_MIDNIGHT - 10 * DAY)?;
    let a = repo.commit_at("a", &[root], TODAY_MIDNIGHT - 6 * DAY)?;
    let b = repo.commit_at("b", &[a], TODAY_MIDNIGHT - 4 * DAY)?;
    let c = repo.commit_at("c", &[b], TODAY_MIDNIGHT - 2 * DAY)?;
    repo.set_remote_branch("one", a)?;
    repo.set_remote_branch("two", b)?;
    repo.set_remote_branch("three", c)?;
    Ok(Linear {
        repo,
        commits: vec![root, a, b, c],
    })
}

fn today() -> (NaiveDate, FixedOffset) {
    (
        NaiveDate::from_ymd_opt(2024, 1, 31).expect("date"),
        FixedOffset::east_opt(0).expect("offset"),
    )
}

fn select(
    graph: &GitGraph,
    options: &StrategyOptions,
    is_poll: bool,
    branch_spec: Option<&str>,
    history: &BuildHistory,
) -> Vec<Revision> {
    let strategy = Strategy::from_options(options).expect("strategy");
    let (date, offset) = today();
    let ctx = SelectionContext::new(graph).with_today(date, offset);
    strategy
        .select_candidates(is_poll, branch_spec, history, &ctx)
        .expect("select")
}

fn commits(revisions: &[Revision]) -> Vec<CommitId> {
    revisions.iter().map(|rev| rev.commit().clone()).collect()
}

#[test]
fn default_builds_newest_tip_then_nothing_on_poll() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = linear()?;
    let graph = GitGraph::open(Some(fixture.repo.path()))?;
    let options = StrategyOptions::new(StrategyKind::Default);
    let c = commit_id(fixture.commits[3]);

    let mut history = BuildHistory::new();
    let first = select(&graph, &options, true, None, &history);
    assert_eq!(commits(&first), vec![c.clone()]);
    assert!(first[0].contains_branch("origin/three"));

    history.record(first[0].clone(), 1, BuildResult::Success);
    assert!(select(&graph, &options, true, None, &history).is_empty());

    // A build call with nothing new rebuilds the last revision.
    let rebuild = select(&graph, &options, false, None, &history);
    assert_eq!(commits(&rebuild), vec![c]);
    Ok(())
}

#[test]
fn default_picks_up_new_commit() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = linear()?;
    let c = fixture.commits[3];
    let mut history = BuildHistory::new();
    history.record(
        Revision::new(commit_id(c)).with_branch("origin/three"),
        1,
        BuildResult::Success,
    );

    let d = fixture.repo.commit_at("d", &[c], TODAY_MIDNIGHT - DAY)?;
    fixture.repo.set_remote_branch("three", d)?;
    let graph = GitGraph::open(Some(fixture.repo.path()))?;

    let selected = select(
        &graph,
        &StrategyOptions::new(StrategyKind::Default),
        true,
        None,
        &history,
    );
    assert_eq!(commits(&selected), vec![commit_id(d)]);
    Ok(())
}

#[test]
fn default_single_target_resolves_remote_branch() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = linear()?;
    let graph = GitGraph::open(Some(fixture.repo.path()))?;
    let options = StrategyOptions::new(StrategyKind::Default);

    let selected = select(&graph, &options, false, Some("two"), &BuildHistory::new());
    assert_eq!(commits(&selected), vec![commit_id(fixture.commits[2])]);
    assert!(selected[0].contains_branch("origin/two"));

    assert!(select(&graph, &options, false, Some("absent"), &BuildHistory::new()).is_empty());
    Ok(())
}

#[test]
fn inverse_builds_everything_but_excluded() -> Result<(), Box<dyn std::error::Error>> {
    let repo = TestRepo::init()?;
    let root = repo.commit_at("root", &[], TODAY_MIDNIGHT - 5 * DAY)?;
    let master = repo.commit_at("master", &[root], TODAY_MIDNIGHT - 4 * DAY)?;
    let feature = repo.commit_at("feature", &[root], TODAY_MIDNIGHT - 3 * DAY)?;
    repo.set_remote_branch("master", master)?;
    repo.set_remote_branch("feature", feature)?;
    let graph = GitGraph::open(Some(repo.path()))?;

    let options = StrategyOptions::new(StrategyKind::Inverse).branches(["origin/master"]);
    let selected = select(&graph, &options, true, None, &BuildHistory::new());
    assert_eq!(commits(&selected), vec![commit_id(feature)]);

    let everything = StrategyOptions::new(StrategyKind::Inverse).branches(["origin/*"]);
    assert!(select(&graph, &everything, false, None, &BuildHistory::new()).is_empty());
    Ok(())
}

#[test]
fn ancestry_bounds_by_age_and_ancestor() -> Result<(), Box<dyn std::error::Error>> {
    let repo = TestRepo::init()?;
    let root = repo.commit_at("root", &[], TODAY_MIDNIGHT - 30 * DAY)?;
    let old = repo.commit_at("old", &[root], TODAY_MIDNIGHT - 20 * DAY)?;
    let fresh = repo.commit_at("fresh", &[root], TODAY_MIDNIGHT - 2 * DAY)?;
    let unrelated = repo.commit_at("unrelated", &[], TODAY_MIDNIGHT - DAY)?;
    repo.set_remote_branch("old", old)?;
    repo.set_remote_branch("fresh", fresh)?;
    repo.set_remote_branch("unrelated", unrelated)?;
    let graph = GitGraph::open(Some(repo.path()))?;

    let by_age = StrategyOptions::new(StrategyKind::Ancestry).max_age_days(7);
    let selected = select(&graph, &by_age, true, None, &BuildHistory::new());
    let mut got = commits(&selected);
    got.sort();
    let mut want = vec![commit_id(fresh), commit_id(unrelated)];
    want.sort();
    assert_eq!(got, want);

    let by_ancestor =
        StrategyOptions::new(StrategyKind::Ancestry).ancestor_commit(root.to_string());
    let mut got = commits(&select(&graph, &by_ancestor, true, None, &BuildHistory::new()));
    got.sort();
    let mut want = vec![commit_id(old), commit_id(fresh)];
    want.sort();
    assert_eq!(got, want);
    Ok(())
}

#[test]
fn compound_orders_by_priority() -> Result<(), Box<dyn std::error::Error>> {
    let repo = TestRepo::init()?;
    let root = repo.commit_at("root", &[], TODAY_MIDNIGHT - 9 * DAY)?;
    let docs = repo.commit_at("docs", &[root], TODAY_MIDNIGHT - 3 * DAY)?;
    let hotfix = repo.commit_at("hotfix", &[root], TODAY_MIDNIGHT - 2 * DAY)?;
    let release = repo.commit_at("release", &[root], TODAY_MIDNIGHT - DAY)?;
    repo.set_remote_branch("docs-update", docs)?;
    repo.set_remote_branch("HOTFIX-12", hotfix)?;
    repo.set_remote_branch("RELEASE-2", release)?;
    let graph = GitGraph::open(Some(repo.path()))?;

    let options = StrategyOptions::new(StrategyKind::Compound).priority(["RELEASE", "HOTFIX"]);
    let selected = select(&graph, &options, true, None, &BuildHistory::new());
    assert_eq!(
        commits(&selected),
        vec![commit_id(release), commit_id(hotfix), commit_id(docs)]
    );
    Ok(())
}

#[test]
fn queue_walks_log_one_commit_at_a_time() -> Result<(), Box<dyn std::error::Error>> {
    let repo = TestRepo::init()?;
    let c1 = repo.commit_at("c1", &[], TODAY_MIDNIGHT - 3 * DAY)?;
    let c2 = repo.commit_at("c2", &[c1], TODAY_MIDNIGHT - 2 * DAY)?;
    let c3 = repo.commit_at("c3", &[c2], TODAY_MIDNIGHT - DAY)?;
    repo.set_remote_branch("master", c3)?;
    let graph = GitGraph::open(Some(repo.path()))?;
    let options = StrategyOptions::new(StrategyKind::Queue).target("origin/master");

    let first = select(&graph, &options, false, None, &BuildHistory::new());
    assert_eq!(
        commits(&first),
        vec![commit_id(c1), commit_id(c2), commit_id(c3)]
    );

    let mut history = BuildHistory::new();
    history.record(
        Revision::new(commit_id(c2)).with_branch("origin/master"),
        2,
        BuildResult::Success,
    );
    let next = select(&graph, &options, true, None, &history);
    assert_eq!(commits(&next), vec![commit_id(c3)]);
    assert!(next[0].contains_branch("origin/master"));
    Ok(())
}

#[test]
fn queue_without_target_walks_all_refs_with_unborn_head() -> Result<(), Box<dyn std::error::Error>>
{
    // Fetch-only clone: HEAD names refs/heads/master, which was never created.
    let repo = TestRepo::init()?;
    let c1 = repo.commit_at("c1", &[], TODAY_MIDNIGHT - 2 * DAY)?;
    let c2 = repo.commit_at("c2", &[c1], TODAY_MIDNIGHT - DAY)?;
    repo.set_remote_branch("master", c2)?;
    assert!(repo.repo().head().is_err());
    let graph = GitGraph::open(Some(repo.path()))?;

    let strategy = QueueStrategy::new(None);
    let (date, offset) = today();
    let ctx = SelectionContext::new(&graph).with_today(date, offset);
    let selected = strategy.select_candidates(false, None, &BuildHistory::new(), &ctx)?;
    assert_eq!(commits(&selected), vec![commit_id(c1), commit_id(c2)]);
    Ok(())
}
