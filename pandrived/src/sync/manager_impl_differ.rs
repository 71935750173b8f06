impl FileActionTaskManager {
    pub(crate) async fn local_diff_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut queue: FolderQueue<LocalFileItem> = FolderQueue::new();
        let mut root: Option<LocalFileItem> = None;
        loop {
            if cancel.is_cancelled() {
                debug!("local differ done");
                return;
            }
            if root.is_none() {
                match self.local_db.get(&self.config.local_folder_path).await {
                    Ok(Some(item)) => {
                        queue.push(item.clone());
                        root = Some(item);
                    }
                    _ => {
                        if pause(&cancel, ROOT_RETRY_DELAY).await {
                            return;
                        }
                        continue;
                    }
                }
            }
            if self.counters.local_changed() == 0 {
                if pause(&cancel, IDLE_DELAY).await {
                    return;
                }
                continue;
            }
            let Some(folder) = queue.pop() else {
                // sweep complete; re-seed from the root for the next one
                if let Some(root) = root.clone() {
                    queue.push(root);
                }
                self.counters.sub_local_changed();
                if pause(&cancel, SWEEP_RESTART_DELAY).await {
                    return;
                }
                continue;
            };
            if let Err(err) = self.diff_local_folder(&folder, &mut queue).await {
                warn!(path = %folder.path, error = %err, "local differ pass failed");
            }
        }
    }

    pub(crate) async fn pan_diff_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut queue: FolderQueue<PanFileItem> = FolderQueue::new();
        let mut root: Option<PanFileItem> = None;
        loop {
            if cancel.is_cancelled() {
                debug!("pan differ done");
                return;
            }
            if root.is_none() {
                match self.pan_db.get(&self.config.pan_folder_path).await {
                    Ok(Some(item)) => {
                        queue.push(item.clone());
                        root = Some(item);
                    }
                    _ => {
                        if pause(&cancel, ROOT_RETRY_DELAY).await {
                            return;
                        }
                        continue;
                    }
                }
            }
            if self.counters.pan_changed() == 0 {
                if pause(&cancel, IDLE_DELAY).await {
                    return;
                }
                continue;
            }
            let Some(folder) = queue.pop() else {
                if let Some(root) = root.clone() {
                    queue.push(root);
                }
                self.counters.sub_pan_changed();
                if pause(&cancel, SWEEP_RESTART_DELAY).await {
                    return;
                }
                continue;
            };
            if let Err(err) = self.diff_pan_folder(&folder, &mut queue).await {
                warn!(path = %folder.path, error = %err, "pan differ pass failed");
            }
            if pause(&cancel, PAN_FOLDER_PACE).await {
                return;
            }
        }
    }

    pub(crate) async fn diff_local_folder(
        &self,
        folder: &LocalFileItem,
        queue: &mut FolderQueue<LocalFileItem>,
    ) -> Result<(), SyncError> {
        let local_children = self
            .local_db
            .children(&folder.path)
            .await
            .unwrap_or_default();
        let pan_children = self
            .pan_db
            .children(&self.mapper.to_pan_path(&folder.path))
            .await
            .unwrap_or_default();
        self.diff_folder_pair(&local_children, &pan_children, Some(queue), None)
            .await
    }

    pub(crate) async fn diff_pan_folder(
        &self,
        folder: &PanFileItem,
        queue: &mut FolderQueue<PanFileItem>,
    ) -> Result<(), SyncError> {
        let pan_children = self.pan_db.children(&folder.path).await.unwrap_or_default();
        let local_children = self
            .local_db
            .children(&self.mapper.to_local_path(&folder.path))
            .await
            .unwrap_or_default();
        self.diff_folder_pair(&local_children, &pan_children, None, Some(queue))
            .await
    }

    /// One folder-pair pass: set algebra over the two child lists, then the
    /// per-child decision table. Folders feed the BFS queues and never emit
    /// actions themselves.
    async fn diff_folder_pair(
        &self,
        local_children: &[LocalFileItem],
        pan_children: &[PanFileItem],
        mut local_queue: Option<&mut FolderQueue<LocalFileItem>>,
        mut pan_queue: Option<&mut FolderQueue<PanFileItem>>,
    ) -> Result<(), SyncError> {
        if local_children.is_empty() && pan_children.is_empty() {
            tokio::time::sleep(EMPTY_FOLDER_DELAY).await;
            return Ok(());
        }

        let diff = diff_children(
            local_children,
            pan_children,
            self.mapper.local_root(),
            self.mapper.pan_root(),
        );

        for file in &diff.pan_only {
            match file.scan_status {
                ScanStatus::Normal => {
                    if !self.config.mode.downloads() {
                        continue;
                    }
                    if file.is_folder {
                        if let Some(queue) = pan_queue.as_deref_mut() {
                            queue.push_unique(file.clone());
                        }
                        continue;
                    }
                    self.emit(ActionKind::Download, None, Some(file.clone()))
                        .await?;
                }
                ScanStatus::Discard => {
                    if self.config.mode.downloads() {
                        self.emit(ActionKind::DeleteLocal, None, Some(file.clone()))
                            .await?;
                    } else {
                        // tombstone is noise when the engine never mirrors it
                        self.pan_db.delete(&file.path).await?;
                    }
                }
            }
        }

        for file in &diff.local_only {
            match file.scan_status {
                ScanStatus::Normal => {
                    if !self.config.mode.uploads() {
                        continue;
                    }
                    if file.is_folder {
                        if let Some(queue) = local_queue.as_deref_mut() {
                            queue.push_unique(file.clone());
                        }
                        continue;
                    }
                    self.emit(ActionKind::Upload, Some(file.clone()), None)
                        .await?;
                }
                ScanStatus::Discard => {
                    if self.config.mode.uploads() {
                        // the remote equivalent is already absent; the worker
                        // no-ops the delete and retires the tombstone
                        self.emit(ActionKind::DeleteRemote, Some(file.clone()), None)
                            .await?;
                    } else {
                        self.local_db.delete(&file.path).await?;
                    }
                }
            }
        }

        for (local_file, pan_file) in &diff.matched {
            self.diff_matched_pair(local_file, pan_file, &mut local_queue, &mut pan_queue)
                .await?;
        }
        Ok(())
    }

    async fn diff_matched_pair(
        &self,
        local_file: &LocalFileItem,
        pan_file: &PanFileItem,
        local_queue: &mut Option<&mut FolderQueue<LocalFileItem>>,
        pan_queue: &mut Option<&mut FolderQueue<PanFileItem>>,
    ) -> Result<(), SyncError> {
        if local_file.scan_status == ScanStatus::Discard
            && pan_file.scan_status == ScanStatus::Discard
        {
            // both sides tombstoned: retire the stale records
            self.local_db.delete(&local_file.path).await?;
            self.pan_db.delete(&pan_file.path).await?;
            return Ok(());
        }
        if local_file.scan_status == ScanStatus::Discard
            && pan_file.scan_status == ScanStatus::Normal
            && local_file.sha1.eq_ignore_ascii_case(&pan_file.sha1)
        {
            if self.config.mode.uploads() {
                self.emit(
                    ActionKind::DeleteRemote,
                    Some(local_file.clone()),
                    Some(pan_file.clone()),
                )
                .await?;
            } else {
                self.local_db.delete(&local_file.path).await?;
            }
            return Ok(());
        }
        if pan_file.scan_status == ScanStatus::Discard
            && local_file.scan_status == ScanStatus::Normal
            && local_file.sha1.eq_ignore_ascii_case(&pan_file.sha1)
        {
            if self.config.mode.downloads() {
                self.emit(
                    ActionKind::DeleteLocal,
                    Some(local_file.clone()),
                    Some(pan_file.clone()),
                )
                .await?;
            } else {
                self.pan_db.delete(&pan_file.path).await?;
            }
            return Ok(());
        }

        if local_file.is_folder {
            // compare one level deeper on both sides
            if let Some(queue) = local_queue.as_deref_mut() {
                queue.push_unique(local_file.clone());
            }
            if let Some(queue) = pan_queue.as_deref_mut() {
                queue.push_unique(pan_file.clone());
            }
            return Ok(());
        }

        let mut local_file = local_file.clone();
        if local_file.sha1.is_empty() {
            if local_file.size == 0 {
                local_file.sha1 = EMPTY_CONTENT_SHA1.to_string();
            } else {
                match sha1_of_file(Path::new(&local_file.path)).await {
                    Ok(digest) => local_file.sha1 = digest,
                    Err(err) => {
                        debug!(path = %local_file.path, error = %err, "local file unreadable, skipping");
                        return Ok(());
                    }
                }
            }
            self.local_db.upsert(&local_file).await?;
        }

        if local_file.sha1.eq_ignore_ascii_case(&pan_file.sha1) {
            return Ok(());
        }

        match self.config.mode {
            SyncMode::UploadOnly => {
                self.emit(ActionKind::Upload, Some(local_file), None).await?;
            }
            SyncMode::DownloadOnly => {
                self.emit(ActionKind::Download, None, Some(pan_file.clone()))
                    .await?;
            }
            SyncMode::TwoWay => {
                if local_file.modified > pan_file.modified {
                    self.emit(ActionKind::Upload, Some(local_file), None).await?;
                } else if local_file.modified < pan_file.modified {
                    self.emit(ActionKind::Download, None, Some(pan_file.clone()))
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn emit(
        &self,
        kind: ActionKind,
        local_file: Option<LocalFileItem>,
        pan_file: Option<PanFileItem>,
    ) -> Result<(), SyncError> {
        let rel_path = match (&local_file, &pan_file) {
            (Some(local), _) => relative_of(&local.path, self.mapper.local_root()),
            (_, Some(pan)) => relative_of(&pan.path, self.mapper.pan_root()),
            (None, None) => return Ok(()),
        };
        let action = SyncAction {
            kind,
            rel_path,
            status: ActionStatus::Create,
            status_updated: 0,
            local_file,
            pan_file,
            drive_id: self.config.drive_id.clone(),
            download_block_size: self.config.file_download_block_size,
            upload_block_size: self.config.file_upload_block_size,
            use_internal_url: self.config.use_internal_url,
            created: 0,
        };
        if self.actions.admit(&action).await? {
            debug!(kind = kind.as_str(), rel_path = %action.rel_path, "action admitted");
            self.counters.add_action_pending();
        }
        Ok(())
    }
}
