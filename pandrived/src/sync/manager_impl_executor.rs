struct WorkerPools {
    upload: Arc<Semaphore>,
    download: Arc<Semaphore>,
    delete_local: Arc<Semaphore>,
    delete_remote: Arc<Semaphore>,
}

impl WorkerPools {
    fn for_kind(&self, kind: ActionKind) -> &Arc<Semaphore> {
        match kind {
            ActionKind::Upload => &self.upload,
            ActionKind::Download => &self.download,
            ActionKind::DeleteLocal => &self.delete_local,
            ActionKind::DeleteRemote => &self.delete_remote,
        }
    }
}

impl FileActionTaskManager {
    pub(crate) async fn executor_loop(self: Arc<Self>, cancel: CancellationToken) {
        let upload_parallel = self.config.file_upload_parallel.max(1);
        let download_parallel = self.config.file_download_parallel.max(1);
        let pools = WorkerPools {
            upload: Arc::new(Semaphore::new(upload_parallel)),
            download: Arc::new(Semaphore::new(download_parallel)),
            delete_local: Arc::new(Semaphore::new(1)),
            delete_remote: Arc::new(Semaphore::new(1)),
        };
        let mut iterations: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.counters.action_pending() == 0 {
                if pause(&cancel, IDLE_DELAY).await {
                    break;
                }
                continue;
            }

            let mut found_any = false;
            for kind in [
                ActionKind::Upload,
                ActionKind::Download,
                ActionKind::DeleteLocal,
                ActionKind::DeleteRemote,
            ] {
                match Self::dispatch_one(&self, kind, &pools, &cancel).await {
                    Ok(found) => found_any = found_any || found,
                    Err(err) => warn!(kind = kind.as_str(), error = %err, "dispatch failed"),
                }
            }

            if !found_any {
                // a full drain attempt saw nothing
                self.counters.sub_action_pending();
            }

            iterations += 1;
            if iterations % COMPACT_EVERY_ITERATIONS == 0 {
                if let Err(err) = self.actions.clean_records(COMPACT_OLDER_THAN_SECS).await {
                    warn!(error = %err, "action compaction failed");
                }
            }

            if pause(&cancel, EXECUTOR_DELAY).await {
                break;
            }
        }

        // join every pool so stop() returns only after in-flight workers end
        let _ = pools.upload.acquire_many(upload_parallel as u32).await;
        let _ = pools.download.acquire_many(download_parallel as u32).await;
        let _ = pools.delete_local.acquire_many(1).await;
        let _ = pools.delete_remote.acquire_many(1).await;
        debug!("executor done");
    }

    async fn dispatch_one(
        mgr: &Arc<Self>,
        kind: ActionKind,
        pools: &WorkerPools,
        cancel: &CancellationToken,
    ) -> Result<bool, SyncError> {
        let in_process = {
            mgr.in_process
                .lock()
                .expect("in-process set mutex poisoned")
                .clone()
        };
        let Some(action) = mgr.actions.claim(kind, &in_process).await? else {
            return Ok(false);
        };
        let Ok(permit) = pools.for_kind(kind).clone().try_acquire_owned() else {
            // pool saturated; the claim did not mutate anything, the action
            // stays claimable on the next pass
            return Ok(true);
        };

        let id = action.id();
        mgr.actions
            .update_status(&id, kind.in_flight_status())
            .await?;
        mgr.in_process
            .lock()
            .expect("in-process set mutex poisoned")
            .insert(id.clone());

        let worker = Arc::clone(mgr);
        let token = cancel.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = worker.run_file_action(&action, &token).await {
                // status stays in flight; the crash-recovery claim path
                // re-dispatches once the next sweep confirms the work
                warn!(
                    kind = action.kind.as_str(),
                    rel_path = %action.rel_path,
                    error = %err,
                    "file action failed"
                );
            }
            worker
                .in_process
                .lock()
                .expect("in-process set mutex poisoned")
                .remove(&id);
        });
        Ok(true)
    }

    pub(crate) async fn run_file_action(
        &self,
        action: &SyncAction,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        match action.kind {
            ActionKind::Upload => self.run_upload(action, cancel).await,
            ActionKind::Download => self.run_download(action, cancel).await,
            ActionKind::DeleteLocal => self.run_delete_local(action).await,
            ActionKind::DeleteRemote => self.run_delete_remote(action).await,
        }
    }

    async fn run_upload(
        &self,
        action: &SyncAction,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let Some(local) = &action.local_file else {
            warn!(rel_path = %action.rel_path, "upload action without local snapshot");
            return Ok(());
        };
        let source = Path::new(&local.path);
        match tokio::fs::metadata(source).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                // vanished between emission and execution
                self.actions
                    .update_status(&action.id(), ActionStatus::NotExisted)
                    .await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        let pan_path = self.mapper.to_pan_path(&local.path);
        self.ensure_pan_parent_folders(&pan_path).await?;

        let link = match self.client.get_upload_link(&pan_path, true).await {
            Ok(link) => link,
            Err(err) if err.is_illegal() => {
                self.actions
                    .update_status(&action.id(), ActionStatus::Illegal)
                    .await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        match self
            .transfer
            .upload_from_path(link.pick(action.use_internal_url), source, cancel)
            .await
        {
            Ok(()) => {}
            Err(TransferError::Cancelled) => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        // mirror the uploaded metadata into the pan inventory
        match self.client.get_resource(&pan_path).await {
            Ok(resource) => {
                self.pan_db
                    .upsert(&pan_item_from_resource(&resource))
                    .await?;
            }
            Err(err) => {
                debug!(path = %pan_path, error = %err, "uploaded metadata refresh failed");
            }
        }

        self.actions
            .update_status(&action.id(), ActionStatus::Success)
            .await?;
        info!(path = %local.path, "uploaded");
        Ok(())
    }

    /// Walks the missing ancestors of `pan_path` top-down and creates them.
    /// Remote folder creation is serialized process-wide to avoid
    /// duplicate-create races against the drive.
    async fn ensure_pan_parent_folders(&self, pan_path: &str) -> Result<(), SyncError> {
        let chain = parent_chain(self.mapper.pan_root(), pan_path);
        if chain.is_empty() {
            return Ok(());
        }
        let _guard = self.folder_create.lock().await;
        for folder in chain {
            match self.client.get_resource(&folder).await {
                Ok(_) => continue,
                Err(err) if err.is_not_found() => {
                    let resource = self.client.create_folder(&folder).await?;
                    self.pan_db
                        .upsert(&pan_item_from_resource(&resource))
                        .await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn run_download(
        &self,
        action: &SyncAction,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let Some(pan) = &action.pan_file else {
            warn!(rel_path = %action.rel_path, "download action without remote snapshot");
            return Ok(());
        };
        let link = match self.client.get_download_link(&pan.path).await {
            Ok(link) => link,
            Err(err) if err.is_not_found() => {
                self.actions
                    .update_status(&action.id(), ActionStatus::NotExisted)
                    .await?;
                return Ok(());
            }
            Err(err) if err.is_illegal() => {
                self.actions
                    .update_status(&action.id(), ActionStatus::Illegal)
                    .await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let target = self.mapper.to_local_path(&pan.path);
        let expected = if pan.sha1.is_empty() {
            None
        } else {
            Some(pan.sha1.as_str())
        };
        match self
            .transfer
            .download_to_path(
                link.pick(action.use_internal_url),
                Path::new(&target),
                expected,
                cancel,
            )
            .await
        {
            Ok(()) => {}
            Err(TransferError::Cancelled) => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        let meta = tokio::fs::metadata(&target).await?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or_else(now_unix);
        self.local_db
            .upsert(&LocalFileItem {
                path: target.clone(),
                is_folder: false,
                size: meta.len() as i64,
                modified,
                sha1: pan.sha1.to_ascii_lowercase(),
                scan_status: ScanStatus::Normal,
                updated_at: String::new(),
            })
            .await?;

        self.actions
            .update_status(&action.id(), ActionStatus::Success)
            .await?;
        info!(path = %target, "downloaded");
        Ok(())
    }

    async fn run_delete_local(&self, action: &SyncAction) -> Result<(), SyncError> {
        let Some(pan) = &action.pan_file else {
            warn!(rel_path = %action.rel_path, "delete-local action without remote snapshot");
            return Ok(());
        };
        let target = self.mapper.to_local_path(&pan.path);
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await?,
            Ok(_) => tokio::fs::remove_file(&target).await?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        if pan.scan_status == ScanStatus::Discard {
            self.pan_db.delete(&pan.path).await?;
        }
        if let Some(local) = &action.local_file {
            if local.scan_status == ScanStatus::Discard {
                self.local_db.delete(&local.path).await?;
            }
        }
        self.actions
            .update_status(&action.id(), ActionStatus::Success)
            .await?;
        info!(path = %target, "deleted local file");
        Ok(())
    }

    async fn run_delete_remote(&self, action: &SyncAction) -> Result<(), SyncError> {
        let Some(local) = &action.local_file else {
            warn!(rel_path = %action.rel_path, "delete-remote action without local snapshot");
            return Ok(());
        };
        let pan_path = self.mapper.to_pan_path(&local.path);
        match self.client.delete_resource(&pan_path).await {
            Ok(()) => {}
            // already absent: the defensive emission is expected to no-op
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        if local.scan_status == ScanStatus::Discard {
            self.local_db.delete(&local.path).await?;
        }
        if let Some(pan) = &action.pan_file {
            if pan.scan_status == ScanStatus::Discard {
                self.pan_db.delete(&pan.path).await?;
            }
        }
        self.actions
            .update_status(&action.id(), ActionStatus::Success)
            .await?;
        info!(path = %pan_path, "deleted remote file");
        Ok(())
    }
}
