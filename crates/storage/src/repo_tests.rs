// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jm_core::Tag;

fn repo() -> JobRepository {
    JobRepository::in_memory().unwrap()
}

#[test]
fn start_direct_assigns_id_and_roundtrips() {
    let repo = repo();
    let job = Job::builder().job_id(1001).build();
    let id = repo.start_direct(&job).unwrap();
    assert!(id > 0);

    let found = repo.find_by_id(id).unwrap();
    assert_eq!(found.id, Some(id));
    assert_eq!(found.job_id, 1001);
    assert_eq!(found.cluster, "testcluster");
    assert_eq!(found.state, JobState::Running);
    assert_eq!(found.resources, job.resources);
}

#[test]
fn start_direct_links_tags() {
    let repo = repo();
    let mut job = Job::builder().build();
    job.tags.push(Tag::new("bottleneck", "memory-bound", "global"));
    let id = repo.start_direct(&job).unwrap();
    let found = repo.find_by_id(id).unwrap();
    assert_eq!(found.tags.len(), 1);
    assert_eq!(found.tags[0].name, "memory-bound");
    assert!(found.tags[0].id > 0);
}

#[test]
fn find_by_id_missing_is_not_found() {
    let repo = repo();
    assert!(matches!(repo.find_by_id(99), Err(RepoError::NotFound)));
}

#[test]
fn find_running_matches_exactly() {
    let repo = repo();
    let job = Job::builder().job_id(7).start_time(5000).build();
    repo.start_direct(&job).unwrap();

    assert!(repo.find_running(7, "testcluster", Some(5000)).is_ok());
    assert!(repo.find_running(7, "testcluster", None).is_ok());
    assert!(repo.find_running(7, "testcluster", Some(6000)).unwrap_err().is_not_found());
    assert!(repo.find_running(7, "other", None).unwrap_err().is_not_found());
}

#[test]
fn find_running_skips_terminal_jobs() {
    let repo = repo();
    let job = Job::builder().job_id(7).build();
    let id = repo.start_direct(&job).unwrap();
    repo.stop(id, 100, JobState::Completed, MonitoringStatus::RunningOrArchiving).unwrap();
    assert!(repo.find_running(7, "testcluster", None).unwrap_err().is_not_found());
}

#[test]
fn find_all_spans_both_tables() {
    let repo = repo();
    repo.start_direct(&Job::builder().job_id(1).start_time(1000).build()).unwrap();
    repo.start(&Job::builder().job_id(1).start_time(200_000).build()).unwrap();
    let all = repo.find_all(1, "testcluster").unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn stop_updates_row() {
    let repo = repo();
    let id = repo.start_direct(&Job::builder().build()).unwrap();
    repo.stop(id, 3600, JobState::Completed, MonitoringStatus::ArchivingSuccessful).unwrap();
    let job = repo.find_by_id(id).unwrap();
    assert_eq!(job.duration, 3600);
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.monitoring_status, MonitoringStatus::ArchivingSuccessful);
}

#[test]
fn stop_missing_row_fails() {
    let repo = repo();
    let err = repo.stop(42, 1, JobState::Completed, MonitoringStatus::Disabled).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn duplicate_identity_insert_is_rejected() {
    let repo = repo();
    let job = Job::builder().job_id(5).start_time(1000).build();
    repo.start_direct(&job).unwrap();
    assert!(repo.start_direct(&job).is_err());
}

#[test]
fn update_metadata_upserts() {
    let repo = repo();
    let id = repo.start_direct(&Job::builder().build()).unwrap();
    repo.update_metadata(id, "jobScript", "#!/bin/bash\nsrun ./a.out").unwrap();
    repo.update_metadata(id, "slurmInfo", "exit 0").unwrap();
    repo.update_metadata(id, "jobScript", "#!/bin/sh").unwrap();

    let job = repo.find_by_id(id).unwrap();
    let meta = job.meta_data.unwrap();
    assert_eq!(meta["jobScript"], "#!/bin/sh");
    assert_eq!(meta["slurmInfo"], "exit 0");
}

#[test]
fn update_footprint_and_energy() {
    let repo = repo();
    let id = repo.start_direct(&Job::builder().build()).unwrap();
    let mut fp = indexmap::IndexMap::new();
    fp.insert("flops_any_avg".to_string(), 1234.5);
    repo.update_footprint(id, &fp).unwrap();
    let mut ef = indexmap::IndexMap::new();
    ef.insert("cpu_power".to_string(), 12.5);
    repo.update_energy(id, 12.5, &ef).unwrap();

    let job = repo.find_by_id(id).unwrap();
    assert_eq!(job.footprint["flops_any_avg"], 1234.5);
    assert_eq!(job.energy, 12.5);
    assert_eq!(job.energy_footprint["cpu_power"], 12.5);
}

#[test]
fn delete_by_id_removes_row() {
    let repo = repo();
    let id = repo.start_direct(&Job::builder().build()).unwrap();
    repo.delete_by_id(id).unwrap();
    assert!(repo.find_by_id(id).unwrap_err().is_not_found());
    assert!(repo.delete_by_id(id).unwrap_err().is_not_found());
}

#[test]
fn delete_before_honors_tag_exemption() {
    let repo = repo();
    let old_tagged = repo.start_direct(&Job::builder().job_id(1).start_time(1000).build()).unwrap();
    repo.start_direct(&Job::builder().job_id(2).start_time(1500).build()).unwrap();
    repo.start_direct(&Job::builder().job_id(3).start_time(9000).build()).unwrap();
    repo.add_tag_or_create("u", false, old_tagged, "keep", "forever", "global").unwrap();

    let deleted = repo.delete_before(5000, true).unwrap();
    assert_eq!(deleted, 1);
    assert!(repo.find_by_id(old_tagged).is_ok());

    let deleted = repo.delete_before(5000, false).unwrap();
    assert_eq!(deleted, 1);
    assert!(repo.find_by_id(old_tagged).unwrap_err().is_not_found());
}

#[test]
fn running_jobs_and_status_listings() {
    let repo = repo();
    let a = repo.start_direct(&Job::builder().job_id(1).start_time(1000).build()).unwrap();
    repo.start_direct(&Job::builder().job_id(2).start_time(2000).build()).unwrap();
    repo.stop(a, 10, JobState::Failed, MonitoringStatus::ArchivingFailed).unwrap();

    assert_eq!(repo.running_jobs().unwrap().len(), 1);
    let failed = repo.jobs_with_status(MonitoringStatus::ArchivingFailed).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, Some(a));
}
